// src/repository/mod.rs

//! Repository generation
//!
//! This module ties the pipeline together:
//! - Scanning the input directory and parsing every package
//! - Reading the already published index for incremental runs
//! - Running one generator per ecosystem, in parallel

pub mod generate;
pub mod index;
pub mod merge;

use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::{Package, PackageType};
use crate::scanner::scan;
use crate::signing::SigningKeys;
use generate::{generator_for, GenerationContext, GenerationSummary};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation shared by every stage of a run
///
/// Checked between files while scanning and parsing, and between packages
/// while copying. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                deadline: Instant::now().checked_add(timeout),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel();
                true
            }
            _ => false,
        }
    }

    /// `Err(Error::Cancelled)` once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    /// Package files recognized by the scanner
    pub scanned: usize,
    /// Files skipped because they could not be parsed
    pub skipped: usize,
    /// One entry per generated ecosystem, in `PackageType` order
    pub summaries: Vec<GenerationSummary>,
}

impl GenerationReport {
    pub fn total_packages(&self) -> usize {
        self.summaries.iter().map(|s| s.packages).sum()
    }
}

/// Scan, parse and generate every ecosystem found in the input directory
///
/// Ecosystems run independently. When one fails the others still finish,
/// and the first failure in `PackageType` order is returned.
pub fn generate_repositories(
    config: &RepositoryConfig,
    keys: &SigningKeys,
    cancel: &CancellationToken,
) -> Result<GenerationReport> {
    info!("Scanning {}", config.input_dir.display());
    let scanned = scan(&config.input_dir, Some(&config.output_dir), cancel)?;
    let mut report = GenerationReport {
        scanned: scanned.len(),
        ..GenerationReport::default()
    };

    if scanned.is_empty() {
        warn!("No packages found in {}", config.input_dir.display());
        return Ok(report);
    }
    info!("Found {} package files", scanned.len());

    let mut by_type: BTreeMap<PackageType, Vec<Package>> = BTreeMap::new();
    for file in &scanned {
        cancel.check()?;
        let codec = file.package_type.codec(config.base_url.as_deref());
        match codec.parse_package(&file.path) {
            Ok(pkg) => by_type.entry(file.package_type).or_default().push(pkg),
            Err(Error::ParseError(msg)) => {
                warn!("Skipping {}: {}", file.path.display(), msg);
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for package_type in by_type.keys() {
        generator_for(*package_type).validate(config)?;
    }

    let outcomes: Vec<(PackageType, Result<GenerationSummary>)> = by_type
        .into_par_iter()
        .map(|(package_type, packages)| {
            let outcome = generate_ecosystem(package_type, packages, config, keys, cancel);
            if let Err(e) = &outcome {
                warn!("{} repository failed: {}", package_type, e);
            }
            (package_type, outcome)
        })
        .collect();

    let mut first_error = None;
    for (_, outcome) in outcomes {
        match outcome {
            Ok(summary) => report.summaries.push(summary),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    report.summaries.sort_by_key(|s| s.package_type);
    info!(
        "Generated {} ecosystem(s), {} packages",
        report.summaries.len(),
        report.total_packages()
    );
    Ok(report)
}

/// Incremental preparation and generation for one ecosystem
fn generate_ecosystem(
    package_type: PackageType,
    packages: Vec<Package>,
    config: &RepositoryConfig,
    keys: &SigningKeys,
    cancel: &CancellationToken,
) -> Result<GenerationSummary> {
    let generator = generator_for(package_type);

    let packages = if config.incremental {
        let codec = package_type.codec(config.base_url.as_deref());
        match codec.parse_existing_index(&config.output_dir, config) {
            Ok(Some(existing)) => {
                debug!("{} existing {} packages", existing.len(), package_type);
                merge::merge(existing, packages, package_type)?
            }
            Ok(None) => {
                info!("No existing {} repository; generating from scratch", package_type);
                packages
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                // Any unreadable existing index means a fresh generation
                warn!(
                    "Existing {} metadata is unreadable ({}); generating from scratch",
                    package_type, e
                );
                packages
            }
        }
    } else {
        packages
    };

    let ctx = GenerationContext {
        config,
        signing: keys.mode_for(package_type),
        cancel,
    };
    generator.generate(&ctx, packages)
}
