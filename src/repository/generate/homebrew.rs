// src/repository/generate/homebrew.rs

//! Homebrew tap generator: `bottles/<file>` and `Formula/<name>.rb`

use super::{
    place_package, published_file_name, GenerationContext, GenerationSummary, RepositoryGenerator,
};
use crate::error::Result;
use crate::filesystem::write_file;
use crate::packages::{Package, PackageType};
use crate::repository::index::homebrew::write_formula;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{info, warn};

const BOTTLES_DIR: &str = "bottles";
const FORMULA_DIR: &str = "Formula";

pub struct HomebrewGenerator;

impl RepositoryGenerator for HomebrewGenerator {
    fn package_type(&self) -> PackageType {
        PackageType::HomebrewBottle
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        packages: Vec<Package>,
    ) -> Result<GenerationSummary> {
        let config = ctx.config;
        let root = config.output_dir.as_path();
        let mut summary = GenerationSummary::new(PackageType::HomebrewBottle, &ctx.signing);

        let mut by_name: BTreeMap<String, Vec<Package>> = BTreeMap::new();
        for pkg in packages {
            by_name.entry(pkg.name.clone()).or_default().push(pkg);
        }

        for (name, mut bottles) in by_name {
            for pkg in &mut bottles {
                if pkg.source_path.is_some() || pkg.published_path.is_none() {
                    let file = published_file_name(pkg)?;
                    pkg.published_path = Some(format!("{}/{}", BOTTLES_DIR, file));
                }
                if let Some(published) = pkg.published_path.as_deref() {
                    place_package(ctx, &mut summary, pkg, &root.join(published), root)?;
                }
            }
            summary.packages += bottles.len();

            let current = current_version(&bottles);
            let (listed, superseded): (Vec<Package>, Vec<Package>) =
                bottles.into_iter().partition(|b| b.version == current);
            for old in &superseded {
                warn!(
                    "{} {} is superseded by {}; its bottle stays in {} but leaves the formula",
                    name, old.version, current, BOTTLES_DIR
                );
            }

            let formula = write_formula(&listed, config.base_url.as_deref())?;
            let path = root.join(FORMULA_DIR).join(format!("{}.rb", name));
            write_file(&path, formula.as_bytes())?;
            info!("Wrote formula {} ({} bottles)", path.display(), listed.len());
        }

        info!("Homebrew tap generated ({} bottles)", summary.packages);
        Ok(summary)
    }
}

/// A formula describes one version: the newest one
fn current_version(bottles: &[Package]) -> String {
    bottles
        .iter()
        .map(|b| b.version.as_str())
        .max_by(|a, b| compare_versions(a, b))
        .unwrap_or_default()
        .to_string()
}

/// Compare bottle versions segment by segment
///
/// Segments are split on `.`, `-` and `_` (the revision suffix). Numeric
/// segments compare as numbers and sort after alphabetic ones.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |v: &str| -> Vec<String> {
        v.split(['.', '-', '_'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    let (left, right) = (split(a), split(b));

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}
