/// Smoke binary for the extraction pipeline: run a single page image
/// through preprocess/detect/filter/persist and print the symbols found.
///
/// Usage: cargo run --release --bin extract-page -- page.png [--method otsu|adaptive|simple] [--threshold 128] [--min 16] [--max 128]

use anyhow::{Context, Result};
use std::sync::Arc;

use scriptorium::core::types::{ExtractionParameters, ThresholdMethod};
use scriptorium::core::Config;
use scriptorium::orchestration::PagePipeline;
use scriptorium::repository::SymbolRepository;
use scriptorium::services::{InMemoryPageStore, PageCache, PageStore};
use scriptorium::utils::Metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <page.png> [--method otsu|adaptive|simple] [--threshold 128] [--min 16] [--max 128]",
            args[0]
        );
        std::process::exit(1);
    }

    let input_path = &args[1];
    let mut params = ExtractionParameters::default();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--method" | "-m" => {
                if i + 1 < args.len() {
                    params.threshold_method = match args[i + 1].as_str() {
                        "adaptive" => ThresholdMethod::Adaptive,
                        "simple" => ThresholdMethod::Simple,
                        _ => ThresholdMethod::Otsu,
                    };
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--threshold" | "-t" => {
                if i + 1 < args.len() {
                    params.threshold_value = args[i + 1].parse().unwrap_or(128);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--min" => {
                if i + 1 < args.len() {
                    params.min_symbol_size = args[i + 1].parse().unwrap_or(16);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--max" => {
                if i + 1 < args.len() {
                    params.max_symbol_size = args[i + 1].parse().unwrap_or(128);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    println!("Loading: {}", input_path);
    let bytes = std::fs::read(input_path).context("Failed to read image file")?;

    let config = Arc::new(Config::new().expect("Failed to load config"));
    let data_dir = std::env::temp_dir().join("extract-page");
    let repository = SymbolRepository::new(
        data_dir.to_str().context("temp dir is not valid UTF-8")?,
        None,
    )
    .await?;

    let store = Arc::new(InMemoryPageStore::new());
    let page = store
        .register("cli", None, input_path, bytes)
        .await
        .context("Failed to register page image")?;
    println!("Image size: {}x{}", page.width, page.height);

    let cache = Arc::new(PageCache::new(
        Arc::clone(&store) as Arc<dyn PageStore>,
        2,
    ));
    let pipeline = PagePipeline::new(config, cache, repository.clone(), Metrics::new());

    let outcome = pipeline.execute(&page, &params, &|_| {}).await?;

    println!("\nExtracted {} symbols:", outcome.symbols.len());
    for symbol in &outcome.symbols {
        let b = symbol.bounding_box;
        println!(
            "  #{:<4} ({:>4},{:>4}) {:>3}x{:<3} sig={} freq={}",
            symbol.id, b.x, b.y, b.width, b.height, symbol.signature, symbol.frequency
        );
    }

    let report = repository.frequency_report();
    println!("\nSignature buckets: {}", report.len());
    for entry in report.iter().take(10) {
        println!("  {} x{}", entry.signature, entry.count);
    }

    Ok(())
}
