use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use picseek::coordinator::{Coordinator, RunOutcome};
use picseek::recognition::HttpOcrEngine;
use picseek::{logging, Config, Error, ImageIndex, IngestOptions, SearchHit, SearchMode};

struct Cli {
    config_path: Option<PathBuf>,
    json: bool,
    command: String,
    args: Vec<String>,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = Cli {
        config_path: None,
        json: false,
        command: String::new(),
        args: Vec::new(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" if cli.command.is_empty() => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" if cli.command.is_empty() => {
                println!("picseek {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-C" => {
                if i + 1 < args.len() {
                    cli.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--json" => cli.json = true,
            arg if cli.command.is_empty() => cli.command = arg.to_string(),
            arg => cli.args.push(arg.to_string()),
        }
        i += 1;
    }

    if cli.command.is_empty() {
        print_help();
        std::process::exit(1);
    }

    cli
}

fn print_help() {
    println!(
        r#"picseek - image fingerprint, text recognition and search index

USAGE:
    picseek [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    ingest <FILE> [--ref REF] [--text TEXT] [--force] [--search]
                            Index an image
    search [MODE] [LIMIT] <KEYWORDS>...
                            Text search. MODE: --exact/-e (default),
                            --comprehensive/-c, --contains/-a or --mode NAME.
                            LIMIT: --limit N or -N
    search-image <FILE> [LIMIT]
                            Duplicate and similarity search
    show <ID>               Show one record
    tag <ID> <TEXT>...      Set text by hand (record becomes manual)
    untag <ID>              Clear text and queue for recognition again
    set-ref <ID> <REF>      Attach an external reference (write-once)
    requeue <ID>            Reset a record to pending
    failures [LIMIT]        List records whose recognition failed
    ocr [--drain]           Run one recognition batch, or drain the queue
    archive                 Run the archive check
    stats                   Record counts by status

OPTIONS:
    --config, -C PATH       Path to config file
    --json                  Print results as JSON
    --version, -V           Show version
    --help, -h              Show this help message

ENVIRONMENT:
    PICSEEK_CONFIG          Path to config file (overrides default location)
    PICSEEK_LOG             Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/picseek/config.toml

See also: picseek-daemon --help"#
    );
}

fn main() -> Result<()> {
    let cli = parse_args();

    let _ = logging::init(logging::Fallback::File(None));

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let index = ImageIndex::open(&config).context("Failed to open image index")?;

    match cli.command.as_str() {
        "ingest" => cmd_ingest(&index, &cli),
        "search" => cmd_search(&index, &cli),
        "search-image" => cmd_search_image(&index, &cli),
        "show" => cmd_show(&index, &cli),
        "tag" => {
            let id = parse_id(&cli.args)?;
            let text = cli.args[1..].join(" ");
            index.tag(id, &text)?;
            println!("Record {id} tagged");
            Ok(())
        }
        "untag" => {
            let id = parse_id(&cli.args)?;
            index.untag(id)?;
            println!("Record {id} untagged");
            Ok(())
        }
        "set-ref" => {
            let id = parse_id(&cli.args)?;
            let reference = cli.args.get(1).ok_or_else(|| anyhow!("set-ref needs a reference"))?;
            index.set_external_ref(id, reference)?;
            println!("Record {id} now references {reference}");
            Ok(())
        }
        "requeue" => {
            let id = parse_id(&cli.args)?;
            index.requeue(id)?;
            println!("Record {id} requeued");
            Ok(())
        }
        "failures" => cmd_failures(&index, &cli),
        "ocr" => cmd_ocr(index, &config, &cli),
        "archive" => {
            let coordinator = coordinator(index, &config);
            match coordinator.run_archive_check()? {
                RunOutcome::Completed(report) => match report.folder {
                    Some(folder) => println!(
                        "Archived {} image(s) to {} ({} active)",
                        report.moved,
                        folder.display(),
                        report.active_after
                    ),
                    None => println!("Nothing to archive ({} active)", report.active_before),
                },
                RunOutcome::Coalesced => println!("Archive check already running"),
            }
            Ok(())
        }
        "stats" => {
            let counts = index.stats()?;
            println!("pending:    {}", counts.pending);
            println!("recognized: {}", counts.recognized);
            println!("manual:     {}", counts.manual);
            println!("failed:     {}", counts.failed);
            println!("archived:   {}", counts.archived);
            println!("total:      {}", counts.total());
            println!("cached:     {}", index.cache().len());
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn coordinator(index: ImageIndex, config: &Config) -> Coordinator {
    let engine = Arc::new(HttpOcrEngine::new(&config.recognition));
    Coordinator::new(Arc::new(index), engine, config.recognition.clone())
}

fn parse_id(args: &[String]) -> Result<i64> {
    let raw = args.first().ok_or_else(|| anyhow!("Missing record id"))?;
    raw.parse().with_context(|| format!("Invalid record id {raw:?}"))
}

/// Limit flags: `--limit N` or the `-N` shorthand. Returns the limit and the
/// remaining arguments.
fn take_limit(args: &[String]) -> Result<(Option<usize>, Vec<String>)> {
    let mut limit = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--limit" || arg == "-n" {
            let value = args.get(i + 1).ok_or_else(|| anyhow!("{arg} needs a number"))?;
            limit = Some(value.parse().with_context(|| format!("Invalid limit {value:?}"))?);
            i += 1;
        } else if let Some(n) = arg.strip_prefix('-').and_then(|n| n.parse::<usize>().ok()) {
            limit = Some(n);
        } else {
            rest.push(arg.clone());
        }
        i += 1;
    }

    Ok((limit, rest))
}

/// Like `take_limit`, but also accepts the limit as a bare number after
/// `leading` positional arguments (`failures 5`, `search-image a.png 5`).
fn take_positional_limit(
    args: &[String],
    leading: usize,
) -> Result<(Option<usize>, Vec<String>)> {
    let (mut limit, mut rest) = take_limit(args)?;

    if rest.len() > leading {
        let value = rest.remove(leading);
        if limit.is_some() {
            bail!("Limit given twice");
        }
        limit = Some(value.parse().with_context(|| format!("Invalid limit {value:?}"))?);
    }
    if rest.len() > leading {
        bail!("Unexpected argument {:?}", rest[leading]);
    }

    Ok((limit, rest))
}

fn cmd_ingest(index: &ImageIndex, cli: &Cli) -> Result<()> {
    let mut options = IngestOptions::default();
    let mut file = None;

    let mut i = 0;
    while i < cli.args.len() {
        match cli.args[i].as_str() {
            "--ref" => {
                options.external_ref = cli.args.get(i + 1).cloned();
                i += 1;
            }
            "--text" => {
                options.text = cli.args.get(i + 1).cloned();
                i += 1;
            }
            "--force" => options.force = true,
            "--search" => options.search_after = true,
            path => file = Some(PathBuf::from(path)),
        }
        i += 1;
    }

    let file = file.ok_or_else(|| anyhow!("ingest needs an image file"))?;
    let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;

    match index.ingest(&bytes, &options) {
        Ok(ingested) => {
            println!("Indexed as record {} ({})", ingested.id, ingested.asset_path.display());
            if options.search_after {
                print_hits(&ingested.similar, cli.json)?;
            }
            Ok(())
        }
        Err(Error::DuplicateFingerprint { existing_id }) => {
            println!("Already indexed as record {existing_id}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_search(index: &ImageIndex, cli: &Cli) -> Result<()> {
    let (limit, rest) = take_limit(&cli.args)?;

    let mut mode = SearchMode::Exact;
    let mut keywords = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--exact" | "-e" => mode = SearchMode::Exact,
            "--comprehensive" | "-c" => mode = SearchMode::Comprehensive,
            "--contains" | "-a" => mode = SearchMode::Contains,
            "--mode" => {
                let token = rest.get(i + 1).ok_or_else(|| anyhow!("--mode needs a value"))?;
                mode = token.parse()?;
                i += 1;
            }
            word => keywords.push(word.to_string()),
        }
        i += 1;
    }

    let hits = index.search_text(mode, &keywords.join(" "), limit)?;
    print_hits(&hits, cli.json)
}

fn cmd_search_image(index: &ImageIndex, cli: &Cli) -> Result<()> {
    let (limit, rest) = take_positional_limit(&cli.args, 1)?;
    let file = rest.first().ok_or_else(|| anyhow!("search-image needs an image file"))?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {file}"))?;

    let hits = index.search_image(&bytes, limit)?;
    print_hits(&hits, cli.json)
}

fn cmd_show(index: &ImageIndex, cli: &Cli) -> Result<()> {
    let record = index.get(parse_id(&cli.args)?)?;

    println!("id:           {}", record.id);
    println!("status:       {}", record.status);
    println!("path:         {}", record.asset_path.display());
    println!("sha256:       {}", record.content_fingerprint);
    println!("md5:          {}", record.md5);
    println!("phash:        {}", record.perceptual_fingerprint);
    println!("external ref: {}", record.external_ref.as_deref().unwrap_or("-"));
    println!("failures:     {}", record.failure_count);
    println!("created:      {}", record.created_at.to_rfc3339());
    if let Some(at) = record.last_attempt_at {
        println!("last attempt: {}", at.to_rfc3339());
    }
    if let Some(at) = record.archived_at {
        println!("archived:     {}", at.to_rfc3339());
    }
    if record.reingested {
        println!("reingested:   yes");
    }
    if let Some(text) = record.text.as_deref().filter(|t| !t.is_empty()) {
        println!("text:\n{text}");
    }
    Ok(())
}

fn cmd_failures(index: &ImageIndex, cli: &Cli) -> Result<()> {
    let (limit, _) = take_positional_limit(&cli.args, 0)?;
    let failures = index.failures(limit)?;

    if failures.is_empty() {
        println!("No failed records");
        return Ok(());
    }

    for entry in failures {
        println!(
            "{:>6}  failures={}  last_attempt={}  ref={}",
            entry.id,
            entry.failure_count,
            entry
                .last_attempt_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            entry.external_ref.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn cmd_ocr(index: ImageIndex, config: &Config, cli: &Cli) -> Result<()> {
    let drain = cli.args.iter().any(|a| a == "--drain");
    let coordinator = coordinator(index, config);

    if drain {
        match coordinator.drain_recognition()? {
            RunOutcome::Completed(report) => println!(
                "{} batch(es): {} recognized, {} preserved, {} retried, {} failed{}",
                report.batches,
                report.totals.recognized,
                report.totals.preserved,
                report.totals.retried,
                report.totals.failed,
                if report.truncated { " (stopped at iteration cap)" } else { "" }
            ),
            RunOutcome::Coalesced => println!("Recognition already running"),
        }
    } else {
        match coordinator.run_recognition_batch()? {
            RunOutcome::Completed(report) => println!(
                "{} selected: {} recognized, {} preserved, {} retried, {} failed, {} skipped",
                report.selected,
                report.recognized,
                report.preserved,
                report.retried,
                report.failed,
                report.skipped
            ),
            RunOutcome::Coalesced => println!("Recognition already running"),
        }
    }
    Ok(())
}

fn print_hits(hits: &[SearchHit], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches");
        return Ok(());
    }

    println!("{} match(es):", hits.len());
    for (n, hit) in hits.iter().enumerate() {
        let location = match &hit.external_ref {
            Some(reference) => format!("ref {reference}"),
            None => hit.asset_path.display().to_string(),
        };
        match (hit.distance, hit.similarity) {
            (Some(distance), Some(similarity)) => println!(
                "{}. #{} {} distance={} similarity={:.1}%",
                n + 1,
                hit.id,
                location,
                distance,
                similarity * 100.0
            ),
            _ => println!("{}. #{} {} [{}]", n + 1, hit.id, location, hit.status),
        }
        if !hit.excerpt.is_empty() {
            println!("   {}", hit.excerpt.replace('\n', " "));
        }
    }
    Ok(())
}
