use adjblend_core::{analyze, build_masks, AnalysisConfig, Curve, Value};

fn fixture_curve(name: &str) -> Curve {
    adjblend_test_fixtures::curves::load(name).expect("load curve fixture")
}

fn fixture_config(name: &str) -> AnalysisConfig {
    adjblend_test_fixtures::curves::config(name)
        .expect("load config fixture")
        .unwrap_or_default()
}

#[test]
fn plateau_has_one_merged_region_and_three_phases() {
    let curve = fixture_curve("plateau");
    let config = fixture_config("plateau");
    let a = analyze(&curve, &config).unwrap();

    assert_eq!(a.regions.len(), 1);
    let r = &a.regions[0];
    assert_eq!((r.start_index, r.end_index), (2, 7));
    assert_eq!(r.peak_velocity, 2.5);

    let spans: Vec<(usize, usize)> = a
        .phases
        .iter()
        .map(|p| (p.start_index, p.end_index))
        .collect();
    assert_eq!(spans, vec![(0, 2), (3, 6), (7, 9)]);
    assert_eq!(a.phases[1].contact_value, Value::f(5.0));
}

#[test]
fn narrow_merge_gap_keeps_transitions_apart() {
    let curve = fixture_curve("plateau");
    let config = AnalysisConfig {
        merge_gap: 1.0,
        ..fixture_config("plateau")
    };
    let a = analyze(&curve, &config).unwrap();
    let spans: Vec<(usize, usize)> = a
        .regions
        .iter()
        .map(|r| (r.start_index, r.end_index))
        .collect();
    assert_eq!(spans, vec![(2, 3), (6, 7)]);
}

#[test]
fn regions_and_phases_are_sorted_and_disjoint() {
    for name in adjblend_test_fixtures::curves::keys() {
        let curve = fixture_curve(&name);
        let a = analyze(&curve, &fixture_config(&name)).unwrap();
        for w in a.regions.windows(2) {
            assert!(w[0].end_index < w[1].start_index, "{name}: overlapping regions");
        }
        for w in a.phases.windows(2) {
            assert!(w[0].end_index < w[1].start_index, "{name}: overlapping phases");
        }
    }
}

#[test]
fn short_curves_yield_empty_sets() {
    for values in [&[3.0f32][..], &[0.0, 10.0][..]] {
        let curve = Curve::from_frames(values).unwrap();
        let a = analyze(&curve, &AnalysisConfig::default()).unwrap();
        assert!(a.regions.is_empty());
        assert!(a.phases.is_empty());
        assert_eq!(a.velocity.len(), values.len());
        let masks = build_masks(&a, &AnalysisConfig::default()).unwrap();
        assert_eq!(masks.len(), values.len());
    }
}

#[test]
fn velocity_weight_is_zero_on_static_windows_and_one_at_peak() {
    let curve = fixture_curve("plateau");
    let a = analyze(&curve, &fixture_config("plateau")).unwrap();
    let w = a.normalized_speed();
    for i in [0, 1, 4, 5, 8, 9] {
        assert_eq!(w[i], 0.0, "sample {i}");
    }
    let peak = a
        .speed
        .iter()
        .enumerate()
        .max_by(|x, y| x.1.total_cmp(y.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(w[peak], 1.0);

    let swing = fixture_curve("ease_swing");
    let a = analyze(&swing, &AnalysisConfig::default()).unwrap();
    let w = a.normalized_speed();
    approx::assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-6);
    assert!(w[0] < w[2] && w[2] < w[4]);
}

#[test]
fn analysis_is_deterministic() {
    let curve = fixture_curve("foot_slide");
    let config = fixture_config("foot_slide");
    let a = analyze(&curve, &config).unwrap();
    let b = analyze(&curve, &config).unwrap();
    assert_eq!(a, b);
    let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&a.speed), bits(&b.speed));
}

#[test]
fn ground_gated_foot_contacts() {
    let curve = fixture_curve("foot_slide");
    let a = analyze(&curve, &fixture_config("foot_slide")).unwrap();
    let spans: Vec<(usize, usize)> = a
        .phases
        .iter()
        .map(|p| (p.start_index, p.end_index))
        .collect();
    assert_eq!(spans, vec![(0, 7), (16, 23)]);
    assert_eq!(a.regions.len(), 1);
}
