#[cfg(not(feature = "serde"))]
fn main() {
    println!("enable the `serde` feature: cargo run --example save_load_json --features serde");
}

#[cfg(feature = "serde")]
fn main() -> so_gaal::Result<()> {
    use so_gaal::{Detector, Inputs, Network, SoGaal, SoGaalConfig};

    let rows: Vec<Vec<f32>> = (0..200)
        .map(|i| vec![(i % 10) as f32 * 0.05, (i % 7) as f32 * 0.05])
        .collect();
    let x = Inputs::from_rows(&rows)?;

    let mut clf = SoGaal::new(SoGaalConfig::default().with_seed(0))?;
    clf.fit(&x, None)?;

    let path = "target/tmp_so_gaal_discriminator.json";
    clf.discriminator()?.save_json(path)?;

    let loaded = Network::load_json(path)?;
    let rescored = loaded.predict(&x)?;
    assert_eq!(rescored.as_slice(), clf.decision_scores()?);
    println!("saved and reloaded discriminator: {path}");
    Ok(())
}
