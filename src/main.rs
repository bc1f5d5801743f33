use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::info;
use woundsight::{
    AnalysisPipeline, ClassifierConfig, FeatureRanker, Language, ModelProvisioner, RankerConfig,
    WoundClassifier,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the wound photograph to analyze
    image: PathBuf,

    /// Output language for labels and descriptors
    #[arg(short, long, default_value = "en")]
    language: Language,

    /// Number of descriptors to return
    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: usize,

    /// Force a fresh download of the model artifacts
    #[arg(short, long)]
    fresh: bool,

    /// Fall back to a simulated result if inference fails
    #[arg(long)]
    simulate_on_failure: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    woundsight::init_logger();
    let args = Args::parse();

    let classifier_config = ClassifierConfig::default();
    let ranker_config = RankerConfig::default();

    if args.fresh {
        info!("Fresh download requested - removing any existing model files...");
        let provisioner = ModelProvisioner::new(
            &classifier_config.cache_dir,
            classifier_config.download_timeout,
        )?;
        provisioner.remove(&classifier_config.source)?;
        provisioner.remove(&ranker_config.source)?;
    }

    let start_time = Instant::now();
    info!("Building classifier...");
    let classifier = Arc::new(WoundClassifier::builder().build().await?);
    info!("Classifier ready (took {:.2?})", start_time.elapsed());

    let ranker = Arc::new(FeatureRanker::new(ranker_config)?);

    let pipeline = AnalysisPipeline::new(classifier.clone(), ranker, args.language)
        .with_top_k(args.top_k)
        .with_simulation_fallback(args.simulate_on_failure);

    let analysis = pipeline.analyze(&args.image).await?;

    println!("\nResults for {}:", args.image.display());
    println!("  Predicted class: {} ({:.1}%)", analysis.label, analysis.confidence * 100.0);
    if analysis.simulated {
        println!("  (simulated - inference was unavailable)");
    }

    println!("  Probabilities:");
    let mut probabilities = analysis.probabilities.clone();
    probabilities.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (label, probability) in probabilities {
        println!("    {}: {:.1}%", label, probability * 100.0);
    }

    if analysis.features.is_empty() {
        println!("  No descriptors available");
    } else {
        println!("  Descriptors:");
        for feature in &analysis.features {
            println!("    {:.2}  {}", feature.score, feature.text);
        }
    }

    if let Some(stats) = classifier.performance_stats() {
        info!(
            "Inference latency: mean {:.3}s over {} prediction(s)",
            stats.mean, stats.count
        );
    }
    info!("Total time: {:.2?}", start_time.elapsed());

    Ok(())
}
