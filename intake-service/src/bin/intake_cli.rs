use anyhow::Context;
use clap::{Parser, ValueEnum};
use intake_engine::format::{FormatKind, Formatted};
use intake_engine::{FieldName, SessionRunner, SessionState, Turn, TurnOutcome};
use intake_service::{ServiceConfig, create_session_runner, telemetry::init_tracing};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl From<OutputFormat> for FormatKind {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Table => FormatKind::Table,
            OutputFormat::Json => FormatKind::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "intake-cli")]
#[command(about = "Extract intake fields from a research request and classify it as CALM or DPIA")]
struct Args {
    /// Request text file; reads standard input when omitted
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Output format for the extracted record
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Ask for missing mandatory fields and offer to create the case
    #[arg(long)]
    interactive: bool,
}

fn print_formatted(formatted: &Formatted) -> anyhow::Result<()> {
    match formatted {
        Formatted::Table(table) => println!("{table}"),
        Formatted::Structured(record) => println!("{}", serde_json::to_string_pretty(record)?),
    }
    Ok(())
}

async fn read_request(args: &Args, stdin: &mut Stdin) -> anyhow::Result<String> {
    let text = match &args.file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            stdin.read_to_string(&mut text).await?;
            text
        }
    };
    if text.trim().is_empty() {
        anyhow::bail!("Request text is empty");
    }
    Ok(text)
}

async fn prompt_line(lines: &mut Lines<BufReader<Stdin>>, question: &str) -> anyhow::Result<Option<String>> {
    println!("{question}");
    print!("> ");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

async fn interactive(runner: &SessionRunner, text: &str, format: FormatKind) -> anyhow::Result<()> {
    let mut outcome: TurnOutcome = runner.start(text).await?;
    println!(
        "Recommended service: {} ({:.0}% confidence)\n{}\n",
        outcome.classification.category,
        outcome.classification.confidence * 100.0,
        outcome.classification.reasoning
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while outcome.state == SessionState::AwaitingAnswers {
        let mut answers: BTreeMap<FieldName, String> = BTreeMap::new();
        for prompt in &outcome.prompts {
            match prompt_line(&mut lines, &prompt.render()).await? {
                Some(answer) if !answer.trim().is_empty() => {
                    answers.insert(prompt.field, answer);
                }
                Some(_) => {}
                None => anyhow::bail!("Input closed with fields still missing"),
            }
        }
        if answers.is_empty() {
            println!("No answers given; the request still needs the fields above.");
            continue;
        }
        outcome = runner
            .continue_session(&outcome.session_id, Turn::Answers(answers))
            .await?;
        for field in &outcome.rejected {
            println!("\"{field}\" needs one of the listed options.");
        }
    }

    print_formatted(&runner.format(&outcome.record, format))?;

    loop {
        let reply = prompt_line(&mut lines, "\nCreate the case now? [y/N]").await?;
        if !matches!(reply.as_deref().map(str::trim), Some("y" | "Y" | "yes")) {
            println!("Case not created.");
            return Ok(());
        }
        match runner.continue_session(&outcome.session_id, Turn::Confirm).await {
            Ok(done) => {
                println!(
                    "Case {} created.",
                    done.case_id.as_deref().unwrap_or("(no id)")
                );
                return Ok(());
            }
            Err(e) => println!("{e}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.interactive && args.file.is_none() {
        anyhow::bail!("--interactive reads answers from standard input; pass the request as FILE");
    }
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format, "intake_cli=warn,intake_engine=warn,intake_service=warn");

    let runner = create_session_runner(&config)?;
    let mut stdin = tokio::io::stdin();
    let text = read_request(&args, &mut stdin).await?;

    if args.interactive {
        return interactive(&runner, &text, args.format.into()).await;
    }

    let analysis = runner.analyze(&text).await;
    print_formatted(&runner.format(&analysis.record, args.format.into()))?;
    println!(
        "\nService category: {} ({:.0}% confidence)",
        analysis.classification.category,
        analysis.classification.confidence * 100.0
    );
    if !analysis.prompts.is_empty() {
        println!("\nMissing mandatory fields:");
        for prompt in &analysis.prompts {
            println!("- {}", prompt.question);
        }
    }

    Ok(())
}
