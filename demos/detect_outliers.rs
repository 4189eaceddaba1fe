use so_gaal::{Detector, EpochSchedule, Inputs, ProbaMethod, SoGaal, SoGaalConfig};

fn main() -> so_gaal::Result<()> {
    env_logger::init();

    // 600 inliers on a small ring around (0.5, 0.5) plus a handful of far-off points.
    let mut rows: Vec<Vec<f32>> = (0..600)
        .map(|i| {
            let t = i as f32 * 0.37;
            vec![0.5 + 0.1 * t.cos(), 0.5 + 0.1 * t.sin()]
        })
        .collect();
    let outliers = [[3.0, 3.0], [-2.0, 0.5], [0.5, 4.0], [2.5, -2.5]];
    rows.extend(outliers.iter().map(|p| p.to_vec()));
    let x = Inputs::from_rows(&rows)?;

    let config = SoGaalConfig {
        stop_epochs: 5,
        contamination: 0.01,
        ..SoGaalConfig::default()
    }
    .with_seed(42)
    .with_schedule(EpochSchedule::Full);

    let mut clf = SoGaal::new(config)?;
    clf.fit(&x, None)?;

    let history = clf.train_history()?;
    println!(
        "epochs_run={} batches={} threshold={}",
        clf.epochs_run()?,
        history.len(),
        clf.threshold()?
    );

    let probe = Inputs::from_rows(&[vec![0.55, 0.45], vec![3.0, 3.0]])?;
    let scores = clf.decision_function(&probe)?;
    let labels = clf.predict(&probe)?;
    let proba = clf.predict_proba(&probe, ProbaMethod::Linear)?;
    for i in 0..probe.len() {
        println!(
            "x={:?} score={} label={} p_outlier={}",
            probe.input(i),
            scores[i],
            labels[i],
            proba[i][1]
        );
    }

    let flagged: Vec<usize> = clf
        .labels()?
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l == 1)
        .map(|(i, _)| i)
        .collect();
    println!("training rows flagged as outliers: {flagged:?}");

    Ok(())
}
