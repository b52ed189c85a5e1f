use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

pub fn resort(path: &Path, force: bool) -> Result<()> {
    if !force {
        bail!("resort changes {path:?} in place; the --force argument is required");
    }
    let report =
        zlp_stitch::resort::resort(path).with_context(|| format!("sorting {path:?}"))?;
    if report.already_sorted {
        info!("{path:?} was already sorted, nothing changed");
    } else {
        info!(
            "sorted {} frames of IMAGELIST and {}",
            report.frames,
            report.images.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_force() {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("missing.fits");
        let err = resort(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"), "{err}");
        assert!(!path.exists());
    }
}
