use cnn_forecaster::{Forecaster, ModelParams, TrainingConfig};
use ndarray::{s, Array3};

fn main() -> cnn_forecaster::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let encode_len = 15;
    let decode_len = 5;

    // Two features: a phase-shifted sine target and a slow cosine covariate
    let data = Array3::from_shape_fn((300, encode_len + decode_len, 2), |(i, t, f)| {
        let x = 0.5 * t as f64 + 0.37 * i as f64;
        if f == 0 { x.sin() } else { (0.1 * x).cos() }
    });
    let train = data.slice(s![..240, .., ..]);
    let valid = data.slice(s![240.., .., ..]);

    let mut model = Forecaster::new(ModelParams::new(encode_len, decode_len, 2, "relu"))?
        .with_training_config(TrainingConfig {
            print_every: 10,
            ..TrainingConfig::default()
        });
    println!("{} ({} parameters)", model, model.num_parameters());

    let history = model.fit(&train, Some(valid), 100, true)?;
    println!(
        "Trained {} epochs ({:?}), final loss {:.6}",
        history.len(),
        history.stop_reason,
        history.final_loss().unwrap_or(f64::NAN)
    );

    let mse = model.evaluate(&valid)?;
    println!("Validation MSE: {:.6}", mse);

    let forecast = model.predict(&valid.slice(s![..3, ..encode_len, ..]))?;
    for (i, row) in forecast.outer_iter().enumerate() {
        let predicted: Vec<String> = row.iter().map(|v| format!("{:.3}", v)).collect();
        let actual: Vec<String> = valid
            .slice(s![i, encode_len.., 0])
            .iter()
            .map(|v| format!("{:.3}", v))
            .collect();
        println!("series {}: predicted [{}] actual [{}]", i, predicted.join(", "), actual.join(", "));
    }

    let dir = std::env::temp_dir().join("cnn_forecaster_demo");
    model.save(&dir)?;
    model.save_history(&dir)?;
    let reloaded = Forecaster::load(&dir)?;
    println!("Reloaded model from {}: {:?}", dir.display(), reloaded.params());

    Ok(())
}
