use company_intel::clients::{FsBlobStore, OpenAiImage, OpenRouterCompletion, TavilySearch};
use company_intel::knowledge::InMemoryKnowledgeStorage;
use company_intel::models::{ReportInput, ReportType};
use company_intel::workflow::ReportGenerator;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let (Some(company_name), Some(company_domain)) = (args.next(), args.next()) else {
        eprintln!("Usage: company-intel <company-name> <company-domain> [competitor ...]");
        eprintln!("Env: OPENROUTER_API_KEY, TAVILY_API_KEY required; OPENAI_API_KEY optional");
        std::process::exit(1);
    };
    let competitors: Vec<String> = args.collect();

    let completion = Arc::new(OpenRouterCompletion::from_env()?);
    let search = Arc::new(TavilySearch::from_env()?);
    let knowledge = Arc::new(InMemoryKnowledgeStorage::new());

    let mut generator = ReportGenerator::new(completion, search, knowledge);
    match OpenAiImage::from_env() {
        Ok(image) => {
            let blobs = Arc::new(FsBlobStore::new("report-images"));
            generator = generator.with_illustrations(Arc::new(image), Some(blobs));
        }
        Err(_) => info!("OPENAI_API_KEY not set, skipping illustrations"),
    }

    let input = ReportInput {
        company_name,
        company_domain,
        industry: std::env::var("COMPANY_INDUSTRY").ok(),
        competitors,
        report_type: ReportType::Weekly,
        date_range_days: 7,
        last_report_at: None,
        owner_id: Some("cli".to_string()),
        min_articles: 0,
        use_deep_research: true,
    };

    let run = match generator.generate(input).await {
        Ok(run) => run,
        Err(e) => {
            dump_trace(&e.trace);
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&run.report)?);
    dump_trace(&run.trace);

    Ok(())
}

fn dump_trace(trace: &company_intel::RunTrace) {
    if std::env::var("REPORT_TRACE").is_err() {
        return;
    }
    match serde_json::to_string_pretty(trace) {
        Ok(trace) => eprintln!("{}", trace),
        Err(e) => warn!("could not serialize trace: {}", e),
    }
}
