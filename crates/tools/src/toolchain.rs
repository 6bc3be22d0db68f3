//! Stage command definitions.
//!
//! Targets are validated before admission; nothing here interpolates into a
//! shell string, every value becomes its own argument.

use serde::{Deserialize, Serialize};
use std::path::Path;

use harrow_common::{CommandSpec, Invocation};

const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "css", "js", "woff", "woff2", "ttf", "eot", "ico", "pdf",
    "txt", "zip", "rar", "7z", "tar", "gz", "bz2", "mp4", "mp3", "mov", "avi", "mkv",
];

/// Binaries and knobs for the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub subfinder: String,
    pub httpx: String,
    pub waybackurls: String,
    pub gauplus: String,
    pub hakrawler: String,
    pub katana: String,
    pub nuclei: String,
    /// Extensions gauplus drops from its results.
    pub excluded_extensions: Vec<String>,
    pub crawl_depth: u32,
    pub katana_rate_limit: u32,
    pub nuclei_rate_limit: u32,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            subfinder: "subfinder".to_string(),
            httpx: "httpx".to_string(),
            waybackurls: "waybackurls".to_string(),
            gauplus: "gauplus".to_string(),
            hakrawler: "hakrawler".to_string(),
            katana: "katana".to_string(),
            nuclei: "nuclei".to_string(),
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            crawl_depth: 3,
            katana_rate_limit: 10,
            nuclei_rate_limit: 50,
        }
    }
}

impl Toolchain {
    /// Enumerate subdomains and keep the ones answering HTTP.
    pub fn discovery(&self, target: &str) -> Invocation {
        Invocation::chain(
            "subfinder|httpx",
            vec![
                CommandSpec::new(&self.subfinder).args(["-d", target, "-all", "-silent"]),
                CommandSpec::new(&self.httpx).arg("-silent"),
            ],
        )
    }

    /// Independent URL collectors, each reading the target from stdin.
    pub fn collection(&self, target: &str) -> Vec<Invocation> {
        let depth = self.crawl_depth.to_string();
        let stdin = format!("{target}\n");

        vec![
            Invocation::single("waybackurls", CommandSpec::new(&self.waybackurls)),
            Invocation::single(
                "gauplus",
                CommandSpec::new(&self.gauplus)
                    .args(["-subs", "-b"])
                    .arg(self.excluded_extensions.join(",")),
            ),
            Invocation::single(
                "hakrawler",
                CommandSpec::new(&self.hakrawler)
                    .arg("-d")
                    .arg(depth.as_str())
                    .args(["-subs", "-u"]),
            ),
            Invocation::single(
                "katana",
                CommandSpec::new(&self.katana)
                    .arg("-d")
                    .arg(depth.as_str())
                    .args(["-silent", "-rl"])
                    .arg(self.katana_rate_limit.to_string()),
            ),
        ]
        .into_iter()
        .map(|inv| inv.with_stdin(stdin.clone()))
        .collect()
    }

    /// Run detection templates over a URL list, emitting JSON lines on stdout.
    pub fn vulnerability_scan(&self, url_list: &Path) -> Invocation {
        Invocation::single(
            "nuclei",
            CommandSpec::new(&self.nuclei)
                .arg("-l")
                .arg(url_list.to_string_lossy())
                .args(["-silent", "-rl"])
                .arg(self.nuclei_rate_limit.to_string())
                .arg("-jsonl"),
        )
    }
}
