use chrono::NaiveDate;
use serde::Serialize;

use riskwatch::classify::AiPassFilter;
use riskwatch::models::ReviewStatus;
use riskwatch::{App, AppError, Config, Result};

const USAGE: &str = r#"Usage: riskwatch <command>

Commands:
  --keyword-pass [kw1,kw2,...]   Escalate MEDIUM records matching keywords to HIGH
  --source-pass <source>         Recompute relatedness for one source
  --ai-pass [--level L] [--source S] [--limit N] [--all]
                                 Let the AI judge decide relevance
  --aggregate [YYYY-MM-DD]       Recompute daily per-country risk stats
  --backfill [days]              Recompute stats for the last N days (default 7)
  --trend [YYYY-MM-DD]           Day-over-day trend of the country stats
  --keyword-stats [country]      HIGH-risk device keyword statistics
  --crawl-feeds                  Crawl configured RSS/Atom feeds
  --pending [status]             List queued AI judgments (default PENDING)
  --confirm <id,...> [--by N]    Confirm queued judgments and apply them
  --reject <id> [--by N]         Reject a queued judgment
  --expire-pending               Expire judgments past their review window"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info for this crate unless RUST_LOG says otherwise)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("riskwatch=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest = &args[1..];

    // Load configuration
    let config = Config::load()?;
    let app = App::new(&config).await?;

    match command.as_str() {
        "--keyword-pass" => {
            let explicit = rest.first().map(|list| {
                list.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect::<Vec<_>>()
            });
            print_json(&app.run_keyword_pass(explicit).await?)
        }
        "--source-pass" => {
            let source = rest
                .first()
                .ok_or_else(|| AppError::InvalidInput("--source-pass needs a source name".into()))?;
            print_json(&app.run_source_pass(source).await?)
        }
        "--ai-pass" => {
            let filter = parse_ai_filter(rest)?;
            print_json(&app.run_ai_pass(filter).await?)
        }
        "--aggregate" => {
            let date = rest.first().map(|d| parse_date(d)).transpose()?;
            print_json(&app.aggregate(date).await?)
        }
        "--backfill" => {
            let days = match rest.first() {
                Some(d) => d
                    .parse()
                    .map_err(|_| AppError::InvalidInput(format!("invalid day count: {d}")))?,
                None => 7,
            };
            print_json(&app.backfill(days).await)
        }
        "--trend" => {
            let date = rest.first().map(|d| parse_date(d)).transpose()?;
            print_json(&app.trend(date).await?)
        }
        "--keyword-stats" => {
            print_json(&app.keyword_stats(rest.first().map(String::as_str)).await?)
        }
        "--crawl-feeds" => print_json(&app.crawl_feeds().await?),
        "--pending" => {
            let status = match rest.first() {
                Some(s) => s.parse()?,
                None => ReviewStatus::Pending,
            };
            print_json(&app.pending_judgments(status, None).await?)
        }
        "--confirm" => {
            let ids = parse_ids(rest.first())?;
            let by = parse_reviewer(&rest[1..])?;
            print_json(&app.confirm_judgments(&ids, by.as_deref()).await)
        }
        "--reject" => {
            let ids = parse_ids(rest.first())?;
            let by = parse_reviewer(&rest[1..])?;
            let mut rejected = Vec::with_capacity(ids.len());
            for id in ids {
                rejected.push(app.reject_judgment(id, by.as_deref()).await?);
            }
            print_json(&rejected)
        }
        "--expire-pending" => print_json(&app.expire_judgments().await?),
        "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => Err(AppError::InvalidInput(format!("unknown command: {other}\n\n{USAGE}"))),
    }
}

fn parse_ai_filter(args: &[String]) -> Result<AiPassFilter> {
    let mut level = None;
    let mut source = None;
    let mut limit = None;
    let mut judge_all = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--level" => level = iter.next().cloned(),
            "--source" => source = iter.next().cloned(),
            "--limit" => {
                let value = iter
                    .next()
                    .ok_or_else(|| AppError::InvalidInput("--limit needs a number".into()))?;
                limit = Some(
                    value
                        .parse()
                        .map_err(|_| AppError::InvalidInput(format!("invalid limit: {value}")))?,
                );
            }
            "--all" => judge_all = true,
            other => return Err(AppError::InvalidInput(format!("unknown --ai-pass option: {other}"))),
        }
    }

    Ok(AiPassFilter::from_params(
        level.as_deref(),
        source.as_deref(),
        limit,
        judge_all,
    ))
}

fn parse_ids(arg: Option<&String>) -> Result<Vec<i64>> {
    let arg = arg.ok_or_else(|| AppError::InvalidInput("expected a comma-separated id list".into()))?;
    arg.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse()
                .map_err(|_| AppError::InvalidInput(format!("invalid id: {id}")))
        })
        .collect()
}

fn parse_reviewer(args: &[String]) -> Result<Option<String>> {
    match args {
        [] => Ok(None),
        [flag, name] if flag == "--by" => Ok(Some(name.clone())),
        _ => Err(AppError::InvalidInput(format!("unexpected arguments: {}", args.join(" ")))),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date (expected YYYY-MM-DD): {value}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
