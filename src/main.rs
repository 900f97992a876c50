use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use heartbeat_classifier::config::Args;
use heartbeat_classifier::data_loading::collect_inputs;
use heartbeat_classifier::output::{self, ReportRow};
use heartbeat_classifier::HeartbeatClassifier;
use log::info;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();

    // Missing or corrupt artifacts are fatal: nothing gets classified
    let classifier =
        HeartbeatClassifier::from_artifacts(args.pipeline_config(), &args.model, &args.labels)
            .context("failed to start the heartbeat classifier")?;

    let files = collect_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("no .npy or .csv beat files found in the given inputs");
    }

    let mut rows = Vec::with_capacity(files.len());
    for file in files {
        info!("Classifying {}", file.display());
        let result = classifier.predict_file(&file);
        let row = ReportRow {
            file,
            result,
            classified_at: Utc::now(),
        };

        if args.json {
            println!("{}", output::to_json_line(&row)?);
        } else {
            println!("{}", output::describe(&row));
        }
        rows.push(row);
    }

    let failed = rows.iter().filter(|r| !r.result.is_ok()).count();
    info!("Classified {} beats, {} failed", rows.len(), failed);

    if let Some(path) = &args.csv_output {
        output::write_report_csv(path, &rows)?;
    }

    Ok(())
}
