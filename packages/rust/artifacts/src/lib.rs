//! Rendering and publishing of the static artifacts.
//!
//! Every artifact is rendered in memory first; only then are files written,
//! each to a temporary sibling that is renamed into place. A failure before
//! the first write therefore leaves the previously published files intact.

mod feed;
mod table;

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use feedbuilder_catalog::PricingModel;
use feedbuilder_shared::{FeedBuilderError, OutputConfig, ProductRecord, Result, RunStatus};

pub use feed::render_feed;
pub use table::{render_light, render_preview};

pub const CATALOG_PREVIEW_CSV: &str = "catalog_preview.csv";
pub const CATALOG_LIGHT_CSV: &str = "catalog_light.csv";
pub const FEED_XML: &str = "feed.xml";
pub const LAST_RUN_TXT: &str = "last_run.txt";
pub const PING_TXT: &str = "_ping.txt";

/// How records are laid out in the artifacts.
#[derive(Debug, Clone, Copy)]
pub struct PublishOptions<'a> {
    /// Column order and feed field tags.
    pub fields: &'a [String],
    pub output: &'a OutputConfig,
    /// Adds the derived pricing columns when set.
    pub pricing: Option<&'a PricingModel>,
}

/// A rendered artifact, not yet on disk.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: &'static str,
    pub content: String,
}

/// A file written by [`publish`].
#[derive(Debug, Clone)]
pub struct PublishedFile {
    pub path: PathBuf,
    pub size_bytes: usize,
}

/// Render the data artifacts (CSV files and feed) for `records`.
#[instrument(skip_all, fields(records = records.len()))]
pub fn render(records: &[ProductRecord], opts: &PublishOptions<'_>) -> Result<Vec<Artifact>> {
    let mut artifacts = vec![Artifact {
        filename: CATALOG_PREVIEW_CSV,
        content: render_preview(
            records,
            opts.fields,
            opts.pricing,
            opts.output.review_columns,
        )?,
    }];

    if opts.output.light_csv {
        artifacts.push(Artifact {
            filename: CATALOG_LIGHT_CSV,
            content: render_light(records, opts.pricing)?,
        });
    }

    artifacts.push(Artifact {
        filename: FEED_XML,
        content: render_feed(
            records,
            opts.fields,
            &opts.output.feed_root,
            &opts.output.feed_item,
        )?,
    });

    debug!(count = artifacts.len(), "artifacts rendered");
    Ok(artifacts)
}

/// Render and write all artifacts for a successful run, then the status
/// marker and `_ping.txt`. Existing files are overwritten whole.
#[instrument(skip_all, fields(out_dir = %out_dir.display(), records = records.len()))]
pub fn publish(
    out_dir: &Path,
    records: &[ProductRecord],
    opts: &PublishOptions<'_>,
    status: &RunStatus,
) -> Result<Vec<PublishedFile>> {
    let mut artifacts = render(records, opts)?;
    artifacts.push(status_artifact(status));
    artifacts.push(Artifact {
        filename: PING_TXT,
        content: "ok".into(),
    });

    let written = write_artifacts(out_dir, &artifacts)?;

    info!(count = written.len(), "artifacts published");
    Ok(written)
}

/// Write only the status marker. Used to record failed runs.
pub fn write_status(out_dir: &Path, status: &RunStatus) -> Result<PublishedFile> {
    create_out_dir(out_dir)?;
    write_artifact(out_dir, &status_artifact(status))
}

fn status_artifact(status: &RunStatus) -> Artifact {
    Artifact {
        filename: LAST_RUN_TXT,
        content: format!("{status}\n"),
    }
}

fn create_out_dir(out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|e| FeedBuilderError::write(out_dir, e))
}

/// Write each artifact in order.
fn write_artifacts(out_dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PublishedFile>> {
    create_out_dir(out_dir)?;
    artifacts
        .iter()
        .map(|artifact| write_artifact(out_dir, artifact))
        .collect()
}

/// Write one artifact atomically: temp file, then rename.
fn write_artifact(out_dir: &Path, artifact: &Artifact) -> Result<PublishedFile> {
    let target = out_dir.join(artifact.filename);
    let temp = out_dir.join(format!(".{}.tmp", artifact.filename));

    std::fs::write(&temp, &artifact.content).map_err(|e| FeedBuilderError::write(&temp, e))?;

    if let Err(e) = std::fs::rename(&temp, &target) {
        let _ = std::fs::remove_file(&temp);
        return Err(FeedBuilderError::write(&target, e));
    }

    debug!(file = artifact.filename, size = artifact.content.len(), "wrote artifact");

    Ok(PublishedFile {
        path: target,
        size_bytes: artifact.content.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use feedbuilder_shared::{FilterConfig, PricingConfig};

    fn fields() -> Vec<String> {
        ["id", "name", "price", "stock"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn records() -> Vec<ProductRecord> {
        vec![
            ProductRecord::from_fields([
                ("id", "123"),
                ("name", "Widget"),
                ("price", "9.99"),
                ("stock", "5"),
            ]),
            ProductRecord::from_fields([
                ("id", "124"),
                ("name", "Gadget"),
                ("price", "19.50"),
                ("stock", "2"),
            ]),
        ]
    }

    fn status() -> RunStatus {
        RunStatus::success(Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(), 1, 2)
    }

    #[test]
    fn publish_writes_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("public");
        let fields = fields();
        let output = OutputConfig::default();
        let opts = PublishOptions {
            fields: &fields,
            output: &output,
            pricing: None,
        };

        let written = publish(&out, &records(), &opts, &status()).unwrap();
        assert_eq!(written.len(), 5);

        for name in [CATALOG_PREVIEW_CSV, CATALOG_LIGHT_CSV, FEED_XML, LAST_RUN_TXT, PING_TXT] {
            assert!(out.join(name).exists(), "missing {name}");
        }

        let status = std::fs::read_to_string(out.join(LAST_RUN_TXT)).unwrap();
        assert_eq!(status, "2026-03-01T06:00:00Z ok files=1 products=2\n");
        assert_eq!(std::fs::read_to_string(out.join(PING_TXT)).unwrap(), "ok");
    }

    #[test]
    fn csv_rows_match_feed_items() {
        let tmp = tempfile::tempdir().unwrap();
        let fields = fields();
        let output = OutputConfig {
            review_columns: false,
            light_csv: false,
            ..OutputConfig::default()
        };
        let opts = PublishOptions {
            fields: &fields,
            output: &output,
            pricing: None,
        };

        publish(tmp.path(), &records(), &opts, &status()).unwrap();

        let csv = std::fs::read_to_string(tmp.path().join(CATALOG_PREVIEW_CSV)).unwrap();
        let feed = std::fs::read_to_string(tmp.path().join(FEED_XML)).unwrap();

        assert_eq!(csv.lines().count() - 1, 2);
        assert_eq!(feed.matches("<item>").count(), 2);
        assert!(csv.contains("123,Widget,9.99,5\n"));
        assert!(!tmp.path().join(CATALOG_LIGHT_CSV).exists());
    }

    #[test]
    fn pricing_columns_follow_model() {
        let model = PricingModel::new(&PricingConfig::default(), &FilterConfig::default());
        let fields = fields();
        let output = OutputConfig::default();
        let opts = PublishOptions {
            fields: &fields,
            output: &output,
            pricing: Some(&model),
        };

        let artifacts = render(&records(), &opts).unwrap();
        let preview = &artifacts[0];
        assert_eq!(preview.filename, CATALOG_PREVIEW_CSV);
        assert!(preview.content.lines().next().unwrap().contains("sell_price"));
    }

    #[test]
    fn publish_overwrites_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let fields = fields();
        let output = OutputConfig::default();
        let opts = PublishOptions {
            fields: &fields,
            output: &output,
            pricing: None,
        };

        publish(tmp.path(), &records(), &opts, &status()).unwrap();
        publish(tmp.path(), &records()[..1], &opts, &status()).unwrap();

        let feed = std::fs::read_to_string(tmp.path().join(FEED_XML)).unwrap();
        assert_eq!(feed.matches("<item>").count(), 1);

        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "temp file left behind: {name}");
        }
    }

    #[test]
    fn write_status_touches_only_the_marker() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(FEED_XML), "previous").unwrap();

        let failed = RunStatus::failure(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            "connection error: refused",
        );
        let file = write_status(tmp.path(), &failed).unwrap();

        assert_eq!(file.path, tmp.path().join(LAST_RUN_TXT));
        let marker = std::fs::read_to_string(&file.path).unwrap();
        assert_eq!(marker, "2026-03-01T12:00:00Z failed: connection error: refused\n");
        assert_eq!(file.size_bytes, marker.len());
        assert_eq!(std::fs::read_to_string(tmp.path().join(FEED_XML)).unwrap(), "previous");
        assert!(!tmp.path().join(PING_TXT).exists());
    }

    #[test]
    fn unwritable_output_is_write_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("public");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        let err = write_status(&blocker, &status()).unwrap_err();
        assert!(matches!(err, FeedBuilderError::Write { .. }));

        let err = write_status(&blocker.join("nested"), &status()).unwrap_err();
        assert!(matches!(err, FeedBuilderError::Write { .. }));
    }
}
