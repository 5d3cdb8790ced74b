use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use gv_grid::{GridConfig, GridOverrides, GridStore, ObjectReader, ObjectStat};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    debug!(root = %config.root.display(), collection = %config.collection, "opening store");
    let grid = GridStore::from_config(config).context("failed to open store")?;
    let format = cli.format;
    match cli.command {
        Command::Put(args) => cmd_put(&grid, args, format),
        Command::Get(args) => cmd_get(&grid, args),
        Command::Rm(args) => cmd_rm(&grid, args, format),
        Command::Ls => cmd_ls(&grid, format),
        Command::Stat(args) => cmd_stat(&grid, args, format),
        Command::Exists(args) => cmd_exists(&grid, args, format),
        Command::Sweep(args) => cmd_sweep(&grid, args, format),
    }
}

/// Built-in defaults, then the `--config` file, then command-line flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<GridConfig> {
    let defaults = match &cli.config {
        Some(path) => GridConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GridConfig::default(),
    };
    let overrides = GridOverrides {
        root: cli.root.clone(),
        collection: cli.collection.clone(),
        chunk_size: cli.chunk_size,
        ..GridOverrides::default()
    };
    Ok(overrides.apply(&defaults))
}

fn cmd_put(grid: &GridStore, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let name = args.name.clone().unwrap_or_else(|| default_name(&args.path));
    let id = if args.path.as_os_str() == "-" {
        grid.store(io::stdin().lock(), &name)?
    } else {
        let file = File::open(&args.path)
            .with_context(|| format!("failed to open {}", args.path.display()))?;
        grid.store(file, &name)?
    };
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "id": id.to_hex(), "filename": name }))
        }
        OutputFormat::Text => println!("{} Stored {} as {}", "✓".green().bold(), name.bold(), id.to_string().yellow()),
    }
    Ok(())
}

fn default_name(path: &Path) -> String {
    if path.as_os_str() == "-" {
        return "stdin".into();
    }
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".into())
}

fn cmd_get(grid: &GridStore, args: GetArgs) -> anyhow::Result<()> {
    let reader = grid.open(&args.id)?;
    let mut reader = if args.verify {
        reader.with_verification(true)
    } else {
        reader
    };
    match &args.output {
        Some(path) => {
            // Stage beside the target; the name only appears once every
            // chunk has been read (and verified).
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let mut tmp = tempfile::Builder::new()
                .prefix(".gridvault")
                .tempfile_in(parent)
                .with_context(|| format!("failed to create {}", path.display()))?;
            copy_object(&mut reader, &mut BufWriter::new(tmp.as_file_mut()))?;
            tmp.persist(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => copy_object(&mut reader, &mut io::stdout().lock())?,
    }
    debug!(id = %reader.id(), bytes = reader.position(), "object written out");
    Ok(())
}

fn copy_object(reader: &mut ObjectReader, out: &mut impl Write) -> anyhow::Result<()> {
    while let Some(chunk) = reader.next_chunk()? {
        out.write_all(&chunk)?;
    }
    out.flush()?;
    Ok(())
}

fn cmd_rm(grid: &GridStore, args: IdArgs, format: OutputFormat) -> anyhow::Result<()> {
    let report = grid.delete(&args.id)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{} Deleted {} ({} chunks)", "✓".green().bold(), report.id.to_string().yellow(), report.chunks_removed);
            if report.orphaned {
                println!("  {} chunks left behind; run `gridvault sweep`", "warning:".yellow().bold());
            }
        }
    }
    Ok(())
}

fn cmd_ls(grid: &GridStore, format: OutputFormat) -> anyhow::Result<()> {
    let stats: Vec<ObjectStat> = grid.list_records()?.into_iter().map(ObjectStat::from).collect();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            if stats.is_empty() {
                println!("No objects.");
            }
            for s in &stats {
                println!(
                    "{}  {:>12}  {}  {}",
                    s.id.to_string().yellow(),
                    s.size,
                    s.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    s.filename
                );
            }
        }
    }
    Ok(())
}

fn cmd_stat(grid: &GridStore, args: IdArgs, format: OutputFormat) -> anyhow::Result<()> {
    let stat = grid.stat(&args.id)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stat)?),
        OutputFormat::Text => {
            println!("Object {}", stat.id.to_string().yellow().bold());
            println!("  Filename: {}", stat.filename);
            println!("  Size: {} bytes", stat.size);
            println!("  Created: {}", stat.created_at.to_rfc3339());
            if let Some(ct) = &stat.content_type {
                println!("  Content-Type: {}", ct.cyan());
            }
        }
    }
    Ok(())
}

fn cmd_exists(grid: &GridStore, args: IdArgs, format: OutputFormat) -> anyhow::Result<()> {
    let exists = grid.exists(&args.id)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "id": args.id, "exists": exists })),
        OutputFormat::Text if exists => println!("{} {}", "✓".green().bold(), args.id),
        OutputFormat::Text => println!("{} {} not found", "✗".red().bold(), args.id),
    }
    Ok(())
}

fn cmd_sweep(grid: &GridStore, args: SweepArgs, format: OutputFormat) -> anyhow::Result<()> {
    let report = grid.sweep(Duration::from_secs(args.grace_secs))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "{} Sweep: {} orphans removed ({} chunks), {} recent skipped",
                "✓".green(),
                report.orphans_removed,
                report.chunks_removed,
                report.skipped_recent
            );
            if report.failures > 0 {
                println!("  {} {} orphans could not be removed", "warning:".yellow().bold(), report.failures);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use gv_grid::BackendKind;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gridvault").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn config_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridvault.toml");
        std::fs::write(&path, "collection = \"media\"\nchunk_size = 1024\nverify_on_read = true\n").unwrap();

        let cli = parse(&["ls", "--config", path.to_str().unwrap(), "--chunk-size", "64"]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.collection, "media");
        assert_eq!(config.chunk_size, 64);
        assert!(config.verify_on_read);
        assert_eq!(config.backend, BackendKind::Disk);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = parse(&["ls", "--config", "/nonexistent/gridvault.toml"]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn put_get_rm_against_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let input = dir.path().join("hello.txt");
        let output = dir.path().join("copy.txt");
        std::fs::write(&input, b"hello gridvault").unwrap();

        let config = resolve_config(&parse(&["ls", "--root", root.to_str().unwrap(), "--chunk-size", "4"])).unwrap();
        let grid = GridStore::from_config(config).unwrap();

        cmd_put(&grid, PutArgs { path: input, name: None }, OutputFormat::Text).unwrap();
        let records = grid.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "hello.txt");
        let id = records[0].id.to_hex();

        cmd_get(&grid, GetArgs { id: id.clone(), output: Some(output.clone()), verify: true }).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"hello gridvault");

        cmd_rm(&grid, IdArgs { id: id.clone() }, OutputFormat::Json).unwrap();
        assert!(!grid.exists(&id).unwrap());
        assert!(cmd_get(&grid, GetArgs { id, output: None, verify: false }).is_err());
    }

    #[test]
    fn failed_get_leaves_no_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let output = dir.path().join("letters.txt");

        let config = resolve_config(&parse(&["ls", "--root", root.to_str().unwrap(), "--chunk-size", "4"])).unwrap();
        let grid = GridStore::from_config(config).unwrap();
        let id = grid.store_bytes(b"abcdefghij", "letters.txt").unwrap();
        std::fs::remove_file(root.join("fs").join("chunks").join(id.to_hex()).join("0000000001.chunk")).unwrap();

        let err = cmd_get(&grid, GetArgs { id: id.to_hex(), output: Some(output.clone()), verify: true }).unwrap_err();
        assert!(err.to_string().contains("corrupted"));
        assert!(!output.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("data")]);
    }

    #[test]
    fn default_name_uses_file_name() {
        assert_eq!(default_name(Path::new("/var/tmp/report.pdf")), "report.pdf");
        assert_eq!(default_name(Path::new("-")), "stdin");
    }
}
