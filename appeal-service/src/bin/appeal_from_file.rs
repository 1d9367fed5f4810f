use anyhow::{Result, anyhow};
use appeal_service::artifact::ARTIFACT_FILE_NAME;
use appeal_service::intake::declared_content_type;
use appeal_service::{
    CandidateDocument, MessagesApiClient, ServiceConfig, StepOutcome, WorkflowController,
    WorkflowSettings,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <denial_letter> [output_dir]", args[0]);
        eprintln!("Example: {} ./denial.pdf ./out", args[0]);
        std::process::exit(1);
    }

    let input = PathBuf::from(&args[1]);
    let output_dir = args.get(2).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let config = ServiceConfig::from_env()?;
    let client = Arc::new(MessagesApiClient::new(&config)?);
    let workflow = WorkflowController::new(client, WorkflowSettings::from(&config));

    println!("Denial letter: {}", input.display());
    workflow.select_document(CandidateDocument::from_path(
        &input,
        declared_content_type(&input),
    ))?;

    println!("Step 1: extracting denial details");
    if let StepOutcome::Failed(e) = workflow.run_extraction().await {
        return Err(anyhow!("Extraction failed: {}", e));
    }

    let snapshot = workflow.snapshot();
    if let Some(record) = &snapshot.extracted {
        println!("{}", serde_json::to_string_pretty(record)?);
    }

    println!("Step 2: generating appeal package");
    if let StepOutcome::Failed(e) = workflow.run_generation().await {
        return Err(anyhow!("Appeal generation failed: {}", e));
    }

    let text = workflow
        .artifact()
        .ok_or_else(|| anyhow!("No appeal package was produced"))?;

    tokio::fs::create_dir_all(&output_dir).await?;
    let output = output_dir.join(ARTIFACT_FILE_NAME);
    tokio::fs::write(&output, &text).await?;

    println!("Appeal written to {}", output.display());
    Ok(())
}
