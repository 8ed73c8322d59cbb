use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use threadlist::projection::{
    GroupKeyStrategy, GroupingMode, ProjectionEngine, Record, SortDirection,
};

#[derive(Parser)]
#[command(name = "bench_projection", about = "Time projection operations on synthetic mail")]
struct Cli {
    /// Records in the initial bulk load
    #[arg(long, default_value_t = 50_000)]
    records: usize,

    /// Incremental operations per phase
    #[arg(long, default_value_t = 2_000)]
    ops: usize,

    /// Check every invariant after each change
    #[arg(long)]
    verify: bool,
}

/// Deterministic bit mixer so runs are comparable.
fn mix(n: u64) -> u64 {
    let mut z = n.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn synthetic(i: usize, base: DateTime<Utc>) -> Record {
    let h = mix(i as u64);
    let minutes_back = (h % (60 * 24 * 90)) as i64;
    let mut record = Record::new(format!("msg-{i}"), base - Duration::minutes(minutes_back))
        .with_correspondent(format!("sender{}", (h >> 20) % 400))
        .with_subject(format!("subject {}", (h >> 32) % 10_000))
        .read((h >> 8) % 3 != 0);
    // roughly a third of the mail belongs to a conversation
    if (h >> 12) % 3 == 0 {
        record = record.with_conversation(format!("conv-{}", (h >> 40) % (i as u64 / 4 + 1)));
    }
    record
}

fn report(label: &str, count: usize, start: Instant) {
    let elapsed = start.elapsed();
    println!(
        "{:<16} {:>8} in {:>10.2?}  ({:.0}/sec)",
        label,
        count,
        elapsed,
        count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let base = Utc
        .with_ymd_and_hms(2026, 3, 12, 12, 0, 0)
        .single()
        .context("invalid base timestamp")?;
    let grouping = GroupKeyStrategy::local(GroupingMode::Date);
    let mut engine = ProjectionEngine::new(grouping, SortDirection::Descending)
        .with_verification(cli.verify);

    println!(
        "Available parallelism: {:?}",
        std::thread::available_parallelism()
    );

    let records: Vec<Record> = (0..cli.records).map(|i| synthetic(i, base)).collect();
    let start = Instant::now();
    engine.bulk_load(records)?;
    report("bulk load", cli.records, start);
    println!(
        "  {} rows, {} threads, {} headers",
        engine.len(),
        engine.threads().count(),
        engine.headers().count()
    );

    let start = Instant::now();
    for i in 0..cli.ops {
        engine.add(synthetic(cli.records + i, base + Duration::minutes(1)))?;
    }
    report("add", cli.ops, start);

    let conversations: Vec<String> = engine
        .threads()
        .take(cli.ops)
        .map(|t| t.conversation_id().to_string())
        .collect();
    let start = Instant::now();
    for conv in &conversations {
        engine.toggle_expansion(conv)?;
    }
    report("expand", conversations.len(), start);

    let start = Instant::now();
    for i in 0..cli.ops {
        let uid = format!("msg-{}", mix(i as u64 + 7) as usize % cli.records.max(1));
        if let Some(record) = engine.record(&uid).cloned() {
            let is_read = record.is_read;
            engine.update(record.read(!is_read))?;
        }
    }
    report("update", cli.ops, start);

    let start = Instant::now();
    for i in 0..cli.ops {
        engine.remove(&format!("msg-{}", i * 3))?;
    }
    report("remove", cli.ops, start);

    let start = Instant::now();
    engine.change_grouping(GroupingMode::Correspondent, SortDirection::Ascending)?;
    report("regroup", engine.total_count(), start);

    let start = Instant::now();
    engine.validate()?;
    report("validate", engine.len(), start);

    Ok(())
}
