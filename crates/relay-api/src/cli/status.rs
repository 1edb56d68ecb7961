//! Live status command.
//!
//! `relayd status` fetches `/api/v1/stats` from a running relay. The same
//! renderer backs the `/stats` console command.

use anyhow::{Context, Result, bail};
use console::style;

use relay_types::config::RelayConfig;
use relay_types::metrics::PipelineStatus;

use crate::http::handlers::stats::StatsBody;
use crate::http::response::ApiResponse;

/// Base URL of the local relay from the `server` config section.
pub fn default_base_url(config: &RelayConfig) -> String {
    format!("http://{}:{}", config.server.host, config.server.port)
}

/// Fetch stats from `base_url` and print them.
pub async fn status(base_url: &str, json: bool) -> Result<()> {
    let url = format!("{}/api/v1/stats", base_url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("could not reach relay at {base_url} (is `relayd serve` running?)"))?;

    let envelope: ApiResponse<StatsBody> = response
        .json()
        .await
        .context("relay returned an unreadable stats response")?;

    if let Some(err) = envelope.errors.first() {
        bail!("{}: {}", err.code, err.message);
    }
    let Some(stats) = envelope.data else {
        bail!("relay returned no stats");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} relay v{}  {}",
        style("⚡").bold(),
        stats.version,
        style(format!("up {}", format_uptime(stats.uptime_secs))).dim()
    );
    println!(
        "  Backend: {} ({})",
        style(&stats.backend_url).cyan(),
        stats.model
    );
    print_status(&stats.status, None);
    Ok(())
}

/// Print a styled pipeline status block.
pub fn print_status(status: &PipelineStatus, uptime_secs: Option<u64>) {
    let m = &status.metrics;

    println!();
    if let Some(uptime) = uptime_secs {
        println!("  {}", style(format!("up {}", format_uptime(uptime))).dim());
    }

    println!("  {}", style("── Requests ──").dim());
    println!("  Total:        {}", style(m.total_requests).bold());
    println!("  Rate limited: {}", highlight_nonzero(m.rate_limited));
    println!("  Failed:       {}", highlight_nonzero(m.failed_requests));
    println!("  Backend:      {} calls, {} retries", m.backend_requests, m.retries);
    println!();

    println!("  {}", style("── Latency ──").dim());
    println!(
        "  min / avg / max: {} / {} / {}",
        format_ms(m.min_latency_ms),
        format_ms(m.avg_latency_ms),
        format_ms(m.max_latency_ms)
    );
    println!("  Slow (>5s):  {}", highlight_nonzero(m.slow_responses));
    println!(
        "  Timeout:     {} (smoothed {}, {} timeouts)",
        format_ms(Some(status.timeout.current_timeout_ms)),
        format_ms(status.timeout.smoothed_latency_ms),
        status.timeout.timeout_count
    );
    println!();

    println!("  {}", style("── Cache ──").dim());
    println!(
        "  Entries:  {}/{}",
        status.cache.entries, status.cache.capacity
    );
    println!(
        "  Hit rate: {} ({} hits, {} misses)",
        style(format!("{:.1}%", m.cache_hit_rate() * 100.0)).green(),
        m.cache_hits,
        m.cache_misses
    );
    println!(
        "  Evicted:  {}  Expired: {}",
        status.cache.evictions, status.cache.expirations
    );
    println!();

    println!("  {}", style("── Pipeline ──").dim());
    println!(
        "  Workers:   {}/{} busy",
        status.in_flight_batches, status.worker_capacity
    );
    println!("  Batches:   {}", m.batches_processed);
    println!("  Chats:     {}", status.active_chats);
    println!("  Senders:   {}", status.tracked_senders);
    println!(
        "  Summaries: {} ok, {} failed",
        m.summaries_completed,
        highlight_nonzero(m.summaries_failed)
    );
    println!("  Tokens:    {}", format_tokens(m.generated_tokens));
    println!();
}

fn highlight_nonzero(n: u64) -> String {
    if n == 0 {
        n.to_string()
    } else {
        style(n).yellow().to_string()
    }
}

fn format_ms(ms: Option<u64>) -> String {
    match ms {
        None => "-".to_string(),
        Some(ms) if ms >= 1000 => format!("{:.1}s", ms as f64 / 1000.0),
        Some(ms) => format!("{ms}ms"),
    }
}

fn format_uptime(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Format token counts with K/M suffixes.
fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}
