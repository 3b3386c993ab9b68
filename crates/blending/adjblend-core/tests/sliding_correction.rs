use adjblend_core::{
    AnalysisConfig, CancelToken, Command, CommandOutput, Config, Curve, HostAdapter, InMemoryHost,
    LayerKind, LayerOp, PhaseState, Session, Value,
};

fn foot_session() -> (Session, InMemoryHost) {
    let curve: Curve = adjblend_test_fixtures::curves::load("foot_slide").unwrap();
    let analysis: AnalysisConfig = adjblend_test_fixtures::curves::config("foot_slide")
        .unwrap()
        .expect("foot_slide names its config");
    let mut host = InMemoryHost::new();
    host.insert("foot.L", curve);
    let session = Session::new(Config {
        analysis,
        ..Default::default()
    })
    .unwrap();
    (session, host)
}

fn x_of(v: &Value) -> f32 {
    v.as_slice()[0]
}

#[test]
fn planted_intervals_are_pinned_to_their_median() {
    let (session, host) = foot_session();
    let report = session.fix_sliding(&host, "foot.L").unwrap();
    // One corrective layer per channel covers both plants.
    assert_eq!(report.created.len(), 1);
    assert!(report.warnings.is_empty());
    assert_eq!(report.phases.len(), 2);
    assert!(report
        .phases
        .iter()
        .all(|p| p.state == PhaseState::Corrected && p.layer == Some(report.created[0])));

    let result = session.blend(&host, "foot.L").unwrap();
    for i in 0..=7 {
        approx::assert_abs_diff_eq!(x_of(result.curve.value(i)), 0.035, epsilon = 1e-5);
    }
    for i in 16..=23 {
        approx::assert_abs_diff_eq!(x_of(result.curve.value(i)), 2.535, epsilon = 1e-5);
    }
    // The swing keeps its shape away from the contacts.
    let base = host.sample("foot.L").unwrap();
    assert_eq!(result.curve.value(12), base.value(12));
}

#[test]
fn second_run_adds_no_layers() {
    let (session, host) = foot_session();
    let first = session.fix_sliding(&host, "foot.L").unwrap();
    let before = session.snapshot("foot.L");
    let second = session.fix_sliding(&host, "foot.L").unwrap();
    assert!(second.created.is_empty());
    assert!(second.removed.is_empty());
    assert_eq!(session.snapshot("foot.L"), before);
    assert!(second
        .phases
        .iter()
        .all(|p| p.layer == Some(first.created[0]) && !p.created));
}

#[test]
fn deleted_corrections_are_recreated() {
    let (session, host) = foot_session();
    let first = session.fix_sliding(&host, "foot.L").unwrap();
    session
        .layer_op("foot.L", LayerOp::Remove { id: first.created[0] })
        .unwrap();
    assert!(session.snapshot("foot.L").is_empty());
    let second = session.fix_sliding(&host, "foot.L").unwrap();
    assert_eq!(second.created.len(), 1);
    assert_eq!(session.snapshot("foot.L").len(), 1);
}

#[test]
fn edited_curve_replaces_corrections() {
    let (session, mut host) = foot_session();
    let first = session.fix_sliding(&host, "foot.L").unwrap();

    let base = host.sample("foot.L").unwrap();
    // Slide the whole foot forward; heights stay on the ground.
    let shifted: Vec<Value> = base
        .values()
        .map(|v| {
            let c = v.as_slice();
            Value::vec3(c[0] + 1.0, c[1], c[2])
        })
        .collect();
    host.insert("foot.L", base.with_values(shifted).unwrap());

    let second = session.fix_sliding(&host, "foot.L").unwrap();
    assert_eq!(second.removed, first.created);
    assert_eq!(second.created.len(), 1);
    let stack = session.snapshot("foot.L");
    assert_eq!(stack.len(), 1);
    assert!(stack.layers.iter().all(|l| l.kind == LayerKind::ContactFix));
}

#[test]
fn corrections_survive_save_and_reload() {
    let (session, host) = foot_session();
    let first = session.fix_sliding(&host, "foot.L").unwrap();
    let json = serde_json::to_string(&session.save_state()).unwrap();

    let (restored, _) = foot_session();
    restored.load_state(serde_json::from_str(&json).unwrap()).unwrap();
    let second = restored.fix_sliding(&host, "foot.L").unwrap();
    assert!(second.created.is_empty());
    assert!(second.removed.is_empty());
    assert_eq!(restored.snapshot("foot.L").ids(), first.created);

    // Reloading into the same session behaves the same way.
    session.load_state(serde_json::from_str(&json).unwrap()).unwrap();
    let third = session.fix_sliding(&host, "foot.L").unwrap();
    assert!(third.created.is_empty());
    assert_eq!(session.snapshot("foot.L").len(), 1);

    let result = restored.blend(&host, "foot.L").unwrap();
    for i in 0..=7 {
        approx::assert_abs_diff_eq!(x_of(result.curve.value(i)), 0.035, epsilon = 1e-5);
    }
}

#[test]
fn config_change_replaces_the_correction() {
    let (session, host) = foot_session();
    let first = session.fix_sliding(&host, "foot.L").unwrap();

    // A tighter tolerance splits each plant in two.
    let mut config = session.config();
    config.analysis.contact_tolerance = 0.022;
    session.set_config(config).unwrap();
    let second = session.fix_sliding(&host, "foot.L").unwrap();
    let spans: Vec<_> = second
        .phases
        .iter()
        .map(|p| (p.phase.start_index, p.phase.end_index))
        .collect();
    assert_eq!(spans, vec![(0, 4), (5, 7), (16, 20), (21, 23)]);
    assert_eq!(second.removed, first.created);
    assert_eq!(second.created.len(), 1);
    assert_eq!(session.snapshot("foot.L").len(), 1);

    // Pinned once, to the new anchors; nothing left over from the first pass.
    let result = session.blend(&host, "foot.L").unwrap();
    for i in 0..=4 {
        approx::assert_abs_diff_eq!(x_of(result.curve.value(i)), 0.02, epsilon = 1e-5);
    }
    for i in 5..=7 {
        approx::assert_abs_diff_eq!(x_of(result.curve.value(i)), 0.06, epsilon = 1e-5);
    }
}

#[test]
fn adjacent_plants_stay_pinned() {
    let mut host = InMemoryHost::new();
    host.insert(
        "toe",
        Curve::from_frames(&[0.0, 0.1, 0.2, 5.0, 5.1, 5.2, 5.3]).unwrap(),
    );
    let session = Session::new(Config {
        analysis: AnalysisConfig {
            contact_threshold: 0.5,
            contact_tolerance: 0.2,
            contact_falloff: 3.0,
            min_contact_frames: 3,
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    let report = session.fix_sliding(&host, "toe").unwrap();
    assert_eq!(report.phases.len(), 2);
    let result = session.blend(&host, "toe").unwrap();
    let xs: Vec<f32> = result.curve.values().map(x_of).collect();
    for (i, x) in xs.iter().enumerate() {
        let anchor = if i <= 2 { 0.1 } else { 5.15 };
        approx::assert_abs_diff_eq!(*x, anchor, epsilon = 1e-5);
    }
}

#[test]
fn short_phases_warn_through_the_command_surface() {
    let (session, mut host) = foot_session();
    let mut config = session.config();
    config.analysis.min_contact_frames = 20;
    session.set_config(config).unwrap();

    let out = session
        .execute(
            &mut host,
            Command::FixSliding {
                channel: "foot.L".into(),
            },
            &CancelToken::new(),
        )
        .unwrap();
    let CommandOutput::Corrected(report) = out else {
        panic!("expected a correction report");
    };
    assert!(report.created.is_empty());
    assert_eq!(report.warnings.len(), 2);
    assert!(session.snapshot("foot.L").is_empty());
}

#[test]
fn apply_all_writes_corrected_curves() {
    let (session, mut host) = foot_session();
    session.fix_sliding(&host, "foot.L").unwrap();
    let out = session
        .execute(&mut host, Command::ApplyAll, &CancelToken::new())
        .unwrap();
    let CommandOutput::Applied(outcome) = out else {
        panic!("expected apply outcome");
    };
    assert_eq!(outcome.succeeded().count(), 1);
    let written = host.output("foot.L").expect("written back");
    approx::assert_abs_diff_eq!(x_of(written.value(0)), 0.035, epsilon = 1e-5);
    // The base is never touched.
    assert_eq!(x_of(host.sample("foot.L").unwrap().value(0)), 0.0);
}
