//! # CRD Generator
//!
//! Prints the component CustomResourceDefinitions as a multi-document YAML
//! stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/components.yaml
//! ```

use anyhow::{Context, Result};
use dsc_operator::crd::{Dashboard, Kueue};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crds = [Dashboard::crd(), Kueue::crd()];
    for crd in &crds {
        let yaml = serde_yaml::to_string(crd)
            .with_context(|| {
                format!(
                    "Failed to serialize CRD {}",
                    crd.metadata.name.as_deref().unwrap_or_default()
                )
            })?;
        println!("---\n{}", yaml.trim_end());
    }
    Ok(())
}
