use cyclemux::{
    ArmPolicy, CyclicTrend, CyclicWorld, DecisionEngine, DecisionNote, EngineConfig, ForceReason,
    Transport,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn trend(p: &[f64]) -> CyclicTrend {
    CyclicTrend::from_probabilities(p.to_vec(), p.len()).unwrap()
}

fn three_arm_trends() -> Vec<CyclicTrend> {
    vec![trend(&[0.1, 0.9]), trend(&[0.5]), trend(&[0.9, 0.1])]
}

fn three_arm_policy() -> ArmPolicy {
    ArmPolicy {
        min_expected: 0.0,
        high_threshold: 0.6,
        medium_threshold: 0.4,
        ..ArmPolicy::default()
    }
}

#[test]
fn small_budget_session_does_not_lock_onto_one_arm() {
    // Tight diversity settings so a 10-unit session is long enough to show switching.
    let policy = ArmPolicy {
        max_consecutive: 2,
        ..three_arm_policy()
    };
    for seed in 0..50u64 {
        let cfg = EngineConfig::uniform(3, policy)
            .with_prior_strength(5.0)
            .with_forced_explore_period(3)
            .with_budget(10);
        let mut e = DecisionEngine::new(&three_arm_trends(), cfg).unwrap();
        let mut world = CyclicWorld::new(vec![vec![0.1, 0.9], vec![0.5], vec![0.9, 0.1]], seed);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut arms = Vec::new();
        while !e.is_exhausted() {
            let d = e.step(&mut rng).unwrap();
            let a = world.attempt(d.arm, d.batch_size).unwrap();
            e.observe(d.arm, d.batch_size, a.success).unwrap();
            arms.push(d.arm);
        }

        assert!(arms.len() >= 4, "seed {seed}: {arms:?}");
        assert!(
            arms.windows(3).all(|w| !(w[0] == w[1] && w[1] == w[2])),
            "seed {seed}: streak longer than 2 in {arms:?}"
        );
    }
}

#[test]
fn three_arm_session_with_default_diversity_settings() {
    let limit = ArmPolicy::default().max_consecutive;
    let play = |seed: u64, budget: u64| {
        let cfg = EngineConfig::uniform(3, three_arm_policy())
            .with_prior_strength(5.0)
            .with_budget(budget);
        let mut e = DecisionEngine::new(&three_arm_trends(), cfg).unwrap();
        let mut world = CyclicWorld::new(vec![vec![0.1, 0.9], vec![0.5], vec![0.9, 0.1]], seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut arms = Vec::new();
        let mut spent = 0;
        while !e.is_exhausted() {
            let d = e.step(&mut rng).unwrap();
            let a = world.attempt(d.arm, d.batch_size).unwrap();
            e.observe(d.arm, d.batch_size, a.success).unwrap();
            spent += d.batch_size;
            arms.push(d.arm);
        }
        assert_eq!(spent, budget, "seed {seed}");
        arms
    };

    for seed in 0..50u64 {
        let arms = play(seed, 10);
        assert!((4..=10).contains(&arms.len()), "seed {seed}: {arms:?}");
    }

    // The same settings over a longer session: streaks stay bounded and every run switches.
    for seed in 0..10u64 {
        let arms = play(seed, 300);
        let longest = arms
            .chunk_by(|a, b| a == b)
            .map(<[usize]>::len)
            .max()
            .unwrap();
        assert!(longest as u64 <= limit, "seed {seed}: streak of {longest}");
        assert!(arms.iter().any(|&a| a != arms[0]), "seed {seed}: never switched");
    }
}

#[test]
fn high_phase_of_slow_starter_is_revisited() {
    // Arm 0 opens at its weak position; it must still be tried and then exploited at
    // its strong position in later cycles.
    let mut revisited = 0;
    for seed in 0..20u64 {
        let cfg = EngineConfig::uniform(3, three_arm_policy())
            .with_prior_strength(5.0)
            .with_budget(400);
        let mut e = DecisionEngine::new(&three_arm_trends(), cfg).unwrap();
        let mut world = CyclicWorld::new(vec![vec![0.1, 0.9], vec![0.5], vec![0.9, 0.1]], seed);
        let mut rng = StdRng::seed_from_u64(1_000 + seed);

        let mut strong_visits = 0;
        while !e.is_exhausted() {
            let d = e.step(&mut rng).unwrap();
            let a = world.attempt(d.arm, d.batch_size).unwrap();
            let obs = e.observe(d.arm, d.batch_size, a.success).unwrap();
            if obs.arm == 0 && obs.position == 1 {
                strong_visits += 1;
            }
        }
        if strong_visits >= 2 {
            revisited += 1;
        }
    }
    assert!(revisited >= 15, "only {revisited}/20 sessions revisited arm 0's strong phase");
}

#[test]
fn dominant_arm_is_interrupted_after_streak_limit() {
    let policy = ArmPolicy {
        max_consecutive: 3,
        ..ArmPolicy::default()
    };
    let cfg = EngineConfig::uniform(3, policy)
        .with_prior_strength(1_000.0)
        .with_forced_explore_period(100)
        .with_budget(1_000);
    let trends = [trend(&[0.99]), trend(&[0.02]), trend(&[0.01])];
    let mut e = DecisionEngine::new(&trends, cfg).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    for i in 0..40 {
        let d = e.step(&mut rng).unwrap();
        if i % 4 == 3 {
            assert_ne!(d.arm, 0, "decision {i} should have been forced away");
            assert!(d.was_forced());
            assert!(d.notes.contains(&DecisionNote::ForcedSwitch {
                reason: ForceReason::StreakLimit,
                from: Some(0),
                tentative: 0,
            }));
            // The dominant arm still had the best sample.
            let top = d
                .candidates
                .iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .unwrap();
            assert_eq!(top.arm, 0);
        } else {
            assert_eq!(d.arm, 0, "decision {i}");
            assert!(!d.was_forced());
        }
        e.observe(d.arm, d.batch_size, d.arm == 0).unwrap();
    }
}

#[test]
fn single_eligible_arm_keeps_streaking() {
    // Only arm 0 clears its floor; the override has nowhere to go.
    let strong = ArmPolicy {
        min_expected: 0.5,
        max_consecutive: 2,
        ..ArmPolicy::default()
    };
    let cfg = EngineConfig {
        arms: vec![strong, strong],
        ..EngineConfig::default()
    }
    .with_prior_strength(500.0)
    .with_budget(100);
    let mut e = DecisionEngine::new(&[trend(&[0.9]), trend(&[0.1])], cfg).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let mut starved = 0;
    for _ in 0..10 {
        let d = e.step(&mut rng).unwrap();
        assert_eq!(d.arm, 0);
        if d
            .notes
            .iter()
            .any(|n| matches!(n, DecisionNote::ForcedSwitchNoAlternative { .. }))
        {
            starved += 1;
        }
        e.observe(d.arm, d.batch_size, true).unwrap();
    }
    assert!(starved >= 4);
    assert_eq!(e.selection().trips(), &[10, 0]);
}
