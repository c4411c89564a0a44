use anyhow::{Context as _, Result, bail};
use mri_report_service::config::ServiceConfig;
use mri_report_service::extract::{LopdfExtractor, TextExtractor};
use mri_report_service::generator::{build_generator, build_prompt};
use mri_report_service::models::{GeneratedReports, ReportKind, WordCounts};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("MRI Report PDF -> Text -> Generated Reports");
    println!("===========================================");

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <pdf_file_path>", args[0]);
        eprintln!("Example: {} /path/to/mri_report.pdf", args[0]);
        std::process::exit(1);
    }
    let pdf_path = &args[1];

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let Some(api_key) = config.default_api_key.clone() else {
        eprintln!("Please set the MRI_API_KEY environment variable");
        eprintln!("Example: export MRI_API_KEY='your_key_here'");
        std::process::exit(1);
    };

    println!("Processing PDF: {}", pdf_path);
    println!("Provider: {:?} ({})", config.provider, config.model);
    println!();

    println!("Step 1: PDF -> Text");
    let pdf = tokio::fs::read(pdf_path)
        .await
        .with_context(|| format!("cannot read {}", pdf_path))?;
    let report_text = tokio::task::spawn_blocking(move || LopdfExtractor.extract(&pdf)).await??;
    if report_text.trim().is_empty() {
        bail!("No text extracted from PDF. Please upload a valid MRI report.");
    }
    println!("Extracted {} characters", report_text.len());
    println!();

    println!("Step 2: Generating reports");
    let generator = build_generator(&config);
    let mut reports = GeneratedReports::default();
    for kind in ReportKind::ALL {
        let prompt = build_prompt(kind, &report_text);
        let text = generator
            .generate(&prompt, &api_key)
            .await
            .with_context(|| format!("{} generation failed", kind.title()))?;

        println!("{}:", kind.title());
        println!("────────────────────────────────────");
        println!("{}", text);
        println!();
        reports.set(kind, text);
    }

    let counts = WordCounts::compute(&report_text, &reports);
    println!("Word Counts:");
    println!("  Original Report: {}", counts.original);
    println!("  Summary: {}", counts.summary);
    println!("  Patient-Friendly Report: {}", counts.patient_friendly);
    println!("  Recommendations: {}", counts.recommendation);

    Ok(())
}
