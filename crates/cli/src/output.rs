//! Output formatting for findings and archive listings

use anyhow::Result;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;

use harrow_common::{Finding, SeverityStats};
use harrow_storage::CompanySummary;

use crate::args::OutputFormat;

/// Print findings plus severity buckets in the requested format.
pub fn print_findings(
    findings: &[Finding],
    stats: &SeverityStats,
    format: OutputFormat,
    duration: Option<Duration>,
) -> Result<()> {
    let rendered = match format {
        OutputFormat::Text => render_table(findings, stats, duration),
        OutputFormat::Json => render_json(findings, stats, duration)?,
        OutputFormat::Csv => render_csv(findings),
    };
    print!("{rendered}");
    Ok(())
}

pub fn print_companies(companies: &[CompanySummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(companies)?),
        OutputFormat::Csv => {
            println!("name,total_scans,last_scan,critical,high,medium,low,info");
            for c in companies {
                let v = &c.vulnerabilities;
                println!(
                    "{},{},{},{},{},{},{},{}",
                    csv_field(&c.name),
                    c.total_scans,
                    c.last_scan.as_deref().unwrap_or(""),
                    v.critical,
                    v.high,
                    v.medium,
                    v.low,
                    v.info
                );
            }
        }
        OutputFormat::Text => {
            if companies.is_empty() {
                println!("\nNo companies scanned yet.\n");
                return Ok(());
            }
            println!("\n{:-<90}", "");
            println!(
                "{:<30} {:>6} {:<20} {:>5} {:>5} {:>5} {:>5} {:>5}",
                "COMPANY", "SCANS", "LAST SCAN", "CRIT", "HIGH", "MED", "LOW", "INFO"
            );
            println!("{:-<90}", "");
            for c in companies {
                let v = &c.vulnerabilities;
                println!(
                    "{:<30} {:>6} {:<20} {:>5} {:>5} {:>5} {:>5} {:>5}",
                    truncate(&c.name, 30),
                    c.total_scans,
                    c.last_scan.as_deref().unwrap_or("-"),
                    v.critical,
                    v.high,
                    v.medium,
                    v.low,
                    v.info
                );
            }
            println!();
        }
    }
    Ok(())
}

/// One entry per line.
pub fn print_list(items: &[String]) {
    for item in items {
        println!("{item}");
    }
}

/// Highest CVSS first, ties by template name.
fn sorted(findings: &[Finding]) -> Vec<&Finding> {
    let mut sorted: Vec<&Finding> = findings.iter().collect();
    sorted.sort_by(|a, b| {
        b.cvss_score
            .total_cmp(&a.cvss_score)
            .then_with(|| a.template_name.cmp(&b.template_name))
    });
    sorted
}

fn render_table(findings: &[Finding], stats: &SeverityStats, duration: Option<Duration>) -> String {
    let mut out = String::new();
    if findings.is_empty() {
        out.push_str("\nNo findings.\n");
    } else {
        let _ = writeln!(out, "\n{:-<100}", "");
        let _ = writeln!(
            out,
            "{:<10} {:>5} {:<30} {:<52}",
            "SEVERITY", "CVSS", "TEMPLATE", "TARGET"
        );
        let _ = writeln!(out, "{:-<100}", "");
        for f in sorted(findings) {
            let _ = writeln!(
                out,
                "{:<10} {:>5.1} {:<30} {:<52}",
                truncate(f.severity.as_str(), 10),
                f.cvss_score,
                truncate(&f.template_name, 30),
                truncate(&f.target, 52)
            );
        }
        let _ = writeln!(out, "{:-<100}", "");
    }

    let _ = writeln!(out, "\nSummary:");
    let _ = writeln!(out, "  Findings: {}", findings.len());
    let _ = writeln!(out, "  Critical: {}", stats.critical);
    let _ = writeln!(out, "  High:     {}", stats.high);
    let _ = writeln!(out, "  Medium:   {}", stats.medium);
    let _ = writeln!(out, "  Low:      {}", stats.low);
    let _ = writeln!(out, "  Info:     {}", stats.info);
    if let Some(d) = duration {
        let _ = writeln!(out, "  Duration: {}", format_duration(d));
    }
    out.push('\n');
    out
}

fn render_json(findings: &[Finding], stats: &SeverityStats, duration: Option<Duration>) -> Result<String> {
    let output = json!({
        "scan_info": {
            "duration_seconds": duration.map(|d| d.as_secs_f64()),
            "duration_formatted": duration.map(format_duration),
            "total_findings": findings.len(),
        },
        "statistics": stats,
        "findings": sorted(findings),
    });
    Ok(format!("{}\n", serde_json::to_string_pretty(&output)?))
}

fn render_csv(findings: &[Finding]) -> String {
    let mut out = String::from("template_name,severity,protocol,target,cvss_score,details,recommendation\n");
    for f in sorted(findings) {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            csv_field(&f.template_name),
            csv_field(f.severity.as_str()),
            csv_field(&f.protocol),
            csv_field(&f.target),
            f.cvss_score,
            csv_field(&f.details),
            csv_field(&f.recommendation)
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    let flat = value.replace('"', "\"\"").replace(['\n', '\r'], " ");
    format!("\"{flat}\"")
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let head: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{millis}ms")
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{total_secs}.{millis:03}s")
        } else {
            format!("{total_secs}s")
        }
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{mins}m {secs}s")
        } else {
            format!("{mins}m")
        }
    }
}
