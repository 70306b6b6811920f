use anyhow::{bail, Result};
use catalog_gateway_aggregator::metrics::normalize_path;
use catalog_gateway_aggregator::{
    ApiStats, CatalogError, CatalogService, Dataset, LaneSet, MetricsRecorder, OverallStats,
};
use colored::Colorize;

pub async fn warm(catalog: &CatalogService, force: bool) -> Result<()> {
    println!("{}", "Warming catalog cache...".cyan().bold());
    println!(
        "  proxies: {}, enrichment: {}\n",
        catalog.proxy_count(),
        if catalog.enrichment_configured() {
            "configured".green()
        } else {
            "not configured".yellow()
        }
    );

    let mut failed = 0;

    if force {
        catalog.invalidate(Dataset::Hero).await?;
    }
    match catalog.hero().await {
        Ok(served) => report_ok(Dataset::Hero, served.data.len(), served.cache_hit),
        Err(e) => {
            report_err(Dataset::Hero, &e);
            failed += 1;
        }
    }

    for set in LaneSet::ALL {
        let dataset = Dataset::Lanes(set);
        if force {
            catalog.invalidate(dataset).await?;
        }
        match catalog.lanes(set).await {
            Ok(served) => {
                let items = served.data.iter().map(|lane| lane.data.len()).sum::<usize>();
                report_ok(dataset, items, served.cache_hit);
            }
            Err(e) => {
                report_err(dataset, &e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} data set(s) could not be built", failed);
    }

    println!("\n{}", "Cache warm.".green().bold());
    Ok(())
}

fn report_ok(dataset: Dataset, items: usize, cache_hit: bool) {
    let source = if cache_hit { "cached" } else { "built" };
    println!(
        "  {} {:<10} {} items ({})",
        "✓".green(),
        dataset.as_str().white(),
        items,
        source.dimmed()
    );
}

fn report_err(dataset: Dataset, error: &CatalogError) {
    println!("  {} {:<10} {}", "✗".red(), dataset.as_str().white(), error);
}

pub async fn stats(metrics: &MetricsRecorder, path: Option<&str>) -> Result<()> {
    if let Some(path) = path {
        let stats = metrics.stats_for(&normalize_path(path)).await?;
        print_endpoint(&stats);
        return Ok(());
    }

    let overall = metrics.overall_stats().await?;
    print_overall(&overall);
    Ok(())
}

fn print_endpoint(stats: &ApiStats) {
    println!("{} {}", "Endpoint".cyan().bold(), stats.path.white());

    if stats.total_calls == 0 {
        println!("{}", "  No calls recorded.".yellow());
        return;
    }

    println!("  calls:        {}", stats.total_calls);
    println!(
        "  success/error: {}/{}",
        stats.success_calls.to_string().green(),
        stats.error_calls.to_string().red()
    );
    println!(
        "  latency:      avg {:.1} ms, min {:.1} ms, max {:.1} ms",
        stats.avg_latency_ms, stats.min_latency_ms, stats.max_latency_ms
    );
    println!(
        "  cache:        {} hits, {} misses",
        stats.cache_hits, stats.cache_misses
    );
}

fn print_overall(overall: &OverallStats) {
    println!("{}", "Catalog gateway analytics".cyan().bold());
    println!("  total calls:    {}", overall.total_api_calls);
    println!("  today:          {}", overall.today_api_calls);
    println!("  avg latency:    {:.1} ms", overall.avg_latency_ms);
    println!("  cache hit rate: {:.1}%", overall.cache_hit_rate);

    let error_rate = format!("{:.1}%", overall.error_rate);
    println!(
        "  error rate:     {}",
        if overall.error_rate > 5.0 {
            error_rate.red()
        } else {
            error_rate.green()
        }
    );
    println!("  uptime:         {}s", overall.uptime_seconds);

    if !overall.top_endpoints.is_empty() {
        println!("\n{}", "Top endpoints".cyan());
        for stats in &overall.top_endpoints {
            println!(
                "  {:>8}  {:<40} {:.1} ms",
                stats.total_calls,
                stats.path.white(),
                stats.avg_latency_ms
            );
        }
    }

    println!("\n{}", "Last 7 days".cyan());
    for day in &overall.daily_trend {
        println!(
            "  {}  {:>8}  {:.1} ms",
            day.date, day.total_calls, day.avg_latency
        );
    }
}

pub async fn invalidate(catalog: &CatalogService, target: &str, id: Option<&str>) -> Result<()> {
    if target.trim().eq_ignore_ascii_case("all") {
        if id.is_some() {
            bail!("--id can only be used with the detail data set");
        }
        let removed = catalog.invalidate_all().await?;
        println!(
            "{} Removed {} cached entr{}",
            "✓".green(),
            removed,
            if removed == 1 { "y" } else { "ies" }
        );
        return Ok(());
    }

    let dataset: Dataset = target.parse()?;

    if let Some(id) = id {
        if dataset != Dataset::Detail {
            bail!("--id can only be used with the detail data set");
        }
        if catalog.invalidate_detail(id).await? {
            println!("{} Removed detail page of {}", "✓".green(), id.white());
        } else {
            println!("{}", format!("No cached detail page for {}", id).yellow());
        }
        return Ok(());
    }

    let removed = catalog.invalidate(dataset).await?;
    println!(
        "{} Removed {} cached entr{} of {}",
        "✓".green(),
        removed,
        if removed == 1 { "y" } else { "ies" },
        dataset.as_str().white()
    );
    Ok(())
}

pub async fn reset_metrics(metrics: &MetricsRecorder) -> Result<()> {
    println!("{}", "Resetting metrics...".cyan().bold());
    let removed = metrics.reset().await?;
    println!(
        "{} Deleted {} metrics key(s)",
        "✓".green().bold(),
        removed
    );
    Ok(())
}
