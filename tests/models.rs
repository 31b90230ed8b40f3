use eyre::Result;
use haemkinetics::data::default_pairs;
use haemkinetics::prelude::*;

fn full_cycle() -> Result<RunRequest> {
    Ok(RunRequest::stepped(0.0, 1760.0, 20.0, None)?)
}

#[test]
fn zero_length_span_returns_initial_state() -> Result<()> {
    for variant in Variant::ALL {
        let initial: Vec<f64> = (1..=variant.species().len())
            .map(|i| i as f64 * 1e-4)
            .collect();
        let mut model = KineticsModel::new(variant, Parameters::default())?;
        let request = RunRequest::new((100.0, 100.0)).with_initial(initial.clone());
        let report = model.run(&request)?;

        assert_eq!(report.len(), 1, "{variant}");
        let trajectory = model.trajectory().unwrap();
        assert_eq!(trajectory.times(), &[100.0]);
        assert_eq!(trajectory.state(0).unwrap().to_vec(), initial, "{variant}");
        assert_eq!(model.state(), ModelState::Solved);
    }

    Ok(())
}

#[test]
fn first_sample_is_the_initial_state() -> Result<()> {
    let initial = vec![5e-3, 0.0, 1e-6, 0.0];
    let mut model = KineticsModel::new(Variant::Model3, Parameters::default())?;
    model.run(&full_cycle()?.with_initial(initial.clone()))?;

    let trajectory = model.trajectory().unwrap();
    assert_eq!(trajectory.times()[0], 0.0);
    assert_eq!(trajectory.state(0).unwrap().to_vec(), initial);
    assert_eq!(model.state(), ModelState::Solved);

    Ok(())
}

#[test]
fn haemozoin_accumulates_over_the_cycle() -> Result<()> {
    for variant in [Variant::Model1, Variant::Model2, Variant::Model3] {
        let mut model = KineticsModel::new(variant, Parameters::default())?;
        model.run(&full_cycle()?)?;

        let trajectory = model.trajectory().unwrap();
        assert_eq!(trajectory.len(), 88);
        let hz = trajectory.column(Species::Hz).unwrap();
        for window in hz.to_vec().windows(2) {
            assert!(window[1] - window[0] >= -1e-10, "{variant}: {window:?}");
        }
        assert!(hz[hz.len() - 1] > 0.0, "{variant}");

        let report = model.report().unwrap();
        assert_eq!(report.time()[0], 16.0);
        assert_eq!(report.time()[87], 16.0 + 1740.0 / 60.0);
    }

    Ok(())
}

#[test]
fn repeated_runs_are_identical() -> Result<()> {
    let request = full_cycle()?.with_initial(vec![2e-3, 0.0, 0.0, 1e-4]);
    let mut model = KineticsModel::new(Variant::Model3, Parameters::default())?;

    let first = model.run(&request)?.clone();
    let source = model.source_concentration();
    let second = model.run(&request)?.clone();

    assert_eq!(first, second);
    assert_eq!(source, model.source_concentration());
    assert_eq!(
        source,
        effective_source_concentration(
            model.parameters().conc_hb_rbc,
            2e-3 + 1e-4,
            model.parameters().volume_ratio()
        )
    );

    Ok(())
}

#[test]
fn wrong_cardinality_fails_before_integration() -> Result<()> {
    let mut model = KineticsModel::new(Variant::Model3, Parameters::default())?;
    model.run(&full_cycle()?)?;
    assert!(model.is_solved());

    let err = model
        .run(&full_cycle()?.with_initial(vec![0.0, 0.0]))
        .unwrap_err();
    assert_eq!(
        err,
        KineticsError::InitialStateLength {
            expected: 4,
            found: 2
        }
    );
    assert!(err.is_configuration());
    assert_eq!(model.state(), ModelState::Configured);
    assert!(model.report().is_none());

    Ok(())
}

#[test]
fn degradation_reports_observed_haemoglobin() -> Result<()> {
    let mut model = KineticsModel::new(Variant::Degradation, Parameters::default())?;
    let report = model.run(&full_cycle()?)?;

    assert_eq!(
        report.columns(),
        &["conc_hb_dv", "conc_fe2pp", "conc_hz", "conc_hb_dv_obs"]
    );
    let hb = report.column("conc_hb_dv").unwrap();
    let fe2pp = report.column("conc_fe2pp").unwrap();
    let observed = report.column("conc_hb_dv_obs").unwrap();
    for i in 0..report.len() {
        assert!((observed[i] - (hb[i] - fe2pp[i])).abs() < 1e-9);
        assert_eq!(report.column("conc_hz").unwrap()[i], 0.0);
    }
    // Delivered haemoglobin only grows
    assert!(hb[report.len() - 1] > hb[0]);

    Ok(())
}

#[test]
fn dopri_agrees_with_bdf() -> Result<()> {
    let request = RunRequest::stepped(0.0, 121.0, 30.0, None)?;
    let mut implicit = KineticsModel::new(Variant::Degradation, Parameters::default())?;
    let mut explicit = KineticsModel::new(Variant::Degradation, Parameters::default())?;

    implicit.run(&request)?;
    explicit.run(&request.clone().with_solver(SolverOptions::default().with_method(Method::Dopri5)))?;

    let (_, a) = implicit.trajectory().unwrap().last().unwrap();
    let (_, b) = explicit.trajectory().unwrap().last().unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() <= 1e-3 * x.abs().max(y.abs()) + 1e-10, "{x} vs {y}");
    }

    Ok(())
}

#[test]
fn model3_is_compared_with_nf54() -> Result<()> {
    let mut model = KineticsModel::new(Variant::Model3, Parameters::default())?;
    let report = model.run(&full_cycle()?)?;

    let data = ExperimentalData::nf54();
    let comparisons = data.compare(report, &default_pairs(false));

    // The report ends at 45 h, so the 47 h measurements are skipped
    assert_eq!(comparisons.len(), 27);
    for comparison in &comparisons {
        assert!(comparison.model.is_finite());
        assert_eq!(comparison.residual, comparison.model - comparison.observed);
    }
    let zero_sem = comparisons
        .iter()
        .filter(|c| c.series == Series::Hz && c.time == 24.0)
        .count();
    assert_eq!(zero_sem, 1);
    assert!(comparisons
        .iter()
        .any(|c| c.series == Series::Hz && c.time == 24.0 && c.z_score.is_none()));

    Ok(())
}
