//! Plain-text performance report.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::PerformanceSummary;
use crate::Result;

/// Render a summary as a human-readable report.
pub fn render(summary: &PerformanceSummary) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut out, summary);
    out
}

/// Render a summary and write it to `path`, replacing any existing file.
pub fn write(path: &Path, summary: &PerformanceSummary) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render(summary))?;
    Ok(())
}

fn write_report(out: &mut String, s: &PerformanceSummary) -> std::fmt::Result {
    writeln!(out, "Performance report ({})", crate::version_string())?;
    writeln!(out, "Generated: {}", s.generated_at.to_rfc3339())?;
    writeln!(out)?;

    writeln!(out, "Cache")?;
    writeln!(out, "  backend:    {}", s.cache.backend)?;
    if s.cache.degraded {
        writeln!(out, "  degraded:   yes (remote backend unreachable)")?;
    }
    writeln!(out, "  hits:       {}", s.cache.hits)?;
    writeln!(out, "  misses:     {}", s.cache.misses)?;
    writeln!(out, "  operations: {}", s.cache.operations)?;
    writeln!(out, "  errors:     {}", s.cache.errors)?;
    writeln!(out, "  hit ratio:  {:.1}%", s.cache.hit_ratio * 100.0)?;
    writeln!(out)?;

    if let Some(ref r) = s.resources {
        writeln!(out, "Process")?;
        writeln!(out, "  cpu:    {:.1}%", r.cpu_percent)?;
        writeln!(out, "  memory: {:.1} MiB", r.memory_mib())?;
        writeln!(out)?;
    }

    writeln!(out, "Operations ({})", s.operations.len())?;
    for op in &s.operations {
        writeln!(
            out,
            "  {:<48} n={:<5} mean={:>8.1}ms p95={:>8.1}ms max={:>8.1}ms",
            op.name,
            op.count,
            op.mean_secs * 1000.0,
            op.p95_secs * 1000.0,
            op.max_secs * 1000.0
        )?;
    }
    writeln!(out)?;

    if !s.slow_queries.is_empty() {
        writeln!(out, "Slow queries")?;
        for name in &s.slow_queries {
            writeln!(out, "  - {name}")?;
        }
        writeln!(out)?;
    }
    if !s.slow_templates.is_empty() {
        writeln!(out, "Slow templates")?;
        for name in &s.slow_templates {
            writeln!(out, "  - {name}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Recommendations")?;
    for rec in &s.recommendations {
        writeln!(out, "  - {rec}")?;
    }
    Ok(())
}
