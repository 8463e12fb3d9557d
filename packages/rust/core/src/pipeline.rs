//! End-to-end run: list → fetch → extract → select → price → publish.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use tracing::{error, info, instrument, warn};

use feedbuilder_artifacts::{PublishOptions, PublishedFile};
use feedbuilder_catalog::{PricingModel, ProductRecord, SelectionRules};
use feedbuilder_fetch::{FetchOptions, FetchedDocument, RemoteSource};
use feedbuilder_shared::{AppConfig, FeedBuilderError, Result, RunStatus, read_list};

/// Configuration for [`run_feed`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Resolved application config (env overrides already applied).
    pub app: AppConfig,
    /// Directory the list file and rules directory are resolved against.
    pub base_dir: PathBuf,
    /// Where artifacts are published.
    pub out_dir: PathBuf,
}

impl RunConfig {
    /// Output directory taken from `[output] dir`, relative to `base_dir`.
    pub fn new(app: AppConfig, base_dir: PathBuf) -> Self {
        let out_dir = base_dir.join(&app.output.dir);
        Self {
            app,
            base_dir,
            out_dir,
        }
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunResult {
    /// Documents retrieved and parsed.
    pub files: usize,
    /// Documents skipped under `skip_failed_files`.
    pub skipped_files: usize,
    /// Item elements found across all documents.
    pub candidates: usize,
    /// Items dropped for a missing required field.
    pub incomplete: usize,
    /// Records rejected by the selection rules.
    pub rejected: usize,
    /// Records cut by the product cap.
    pub truncated: usize,
    /// Records published.
    pub products: usize,
    pub published: Vec<PublishedFile>,
    pub status: RunStatus,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document has been parsed.
    fn document_extracted(&self, name: &str, records: usize, current: usize, total: usize);
    /// Called when the run completes successfully.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_extracted(&self, _name: &str, _records: usize, _current: usize, _total: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run one full conversion.
///
/// `connect` opens the document source; the source lives only for the fetch
/// phase and is dropped (closing any connection) before parsing starts.
///
/// On any error a failure status is written to `last_run.txt` when possible,
/// previously published artifacts are left as they were, and the error is
/// returned.
#[instrument(skip_all, fields(out_dir = %config.out_dir.display()))]
pub fn run_feed<S, C>(
    config: &RunConfig,
    connect: C,
    progress: &dyn ProgressReporter,
) -> Result<RunResult>
where
    S: RemoteSource,
    C: FnOnce() -> Result<S>,
{
    let start = Instant::now();

    match execute(config, connect, progress, start) {
        Ok(result) => {
            info!(
                files = result.files,
                products = result.products,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "run complete"
            );
            progress.done(&result);
            Ok(result)
        }
        Err(e) => {
            record_failure(&config.out_dir, &e);
            Err(e)
        }
    }
}

/// Log `error` and write it as a failed run to `last_run.txt` in `out_dir`.
/// A failure to write the marker is only logged.
pub fn record_failure(out_dir: &Path, error: &FeedBuilderError) {
    error!(error = %error, "run failed");
    let status = RunStatus::failure(Utc::now(), error);
    if let Err(status_err) = feedbuilder_artifacts::write_status(out_dir, &status) {
        warn!(error = %status_err, "could not record failure status");
    }
}

fn execute<S, C>(
    config: &RunConfig,
    connect: C,
    progress: &dyn ProgressReporter,
    start: Instant,
) -> Result<RunResult>
where
    S: RemoteSource,
    C: FnOnce() -> Result<S>,
{
    let app = &config.app;

    // 1. Inputs
    let list_path = config.base_dir.join(&app.input.list_file);
    let names = read_list(&list_path)?;
    if names.is_empty() {
        return Err(FeedBuilderError::config(format!(
            "{} lists no files",
            list_path.display()
        )));
    }
    let rules = SelectionRules::load(&config.base_dir.join(&app.input.rules_dir))?;

    // 2. Fetch, with the source scoped to this block
    progress.phase("Fetching");
    let fetched = {
        let mut source = connect()?;
        let opts = FetchOptions {
            skip_failed: app.input.skip_failed_files,
        };
        feedbuilder_fetch::fetch_documents(&mut source, &names, &opts)?
    };
    let mut skipped_files = fetched.skipped.len();

    // 3. Extract
    progress.phase("Parsing");
    let total = fetched.documents.len();
    let mut files = 0;
    let mut candidates = 0;
    let mut incomplete = 0;
    let mut records: Vec<ProductRecord> = Vec::new();

    for (i, FetchedDocument { name, bytes }) in fetched.documents.into_iter().enumerate() {
        let extraction = match feedbuilder_catalog::extract(&bytes, &app.schema) {
            Ok(extraction) => extraction,
            Err(e) if app.input.skip_failed_files => {
                warn!(file = %name, error = %e, "parse failed, skipping file");
                skipped_files += 1;
                continue;
            }
            Err(e) => {
                return Err(FeedBuilderError::parse(format!("{name}: {}", parse_detail(e))));
            }
        };

        info!(
            file = %name,
            records = extraction.records.len(),
            skipped = extraction.skipped,
            "parsed"
        );
        progress.document_extracted(&name, extraction.records.len(), i + 1, total);

        files += 1;
        candidates += extraction.candidates;
        incomplete += extraction.skipped;
        records.extend(extraction.records);
    }

    if files == 0 {
        return Err(FeedBuilderError::connection(
            "no document could be retrieved and parsed",
        ));
    }

    // 4. Select
    progress.phase("Selecting");
    let selection = feedbuilder_catalog::select(
        records,
        &app.filters,
        &rules,
        Local::now().naive_local(),
    );

    // 5. Publish
    progress.phase("Publishing");
    let pricing = app
        .pricing
        .enabled
        .then(|| PricingModel::new(&app.pricing, &app.filters));
    let opts = PublishOptions {
        fields: &app.schema.fields,
        output: &app.output,
        pricing: pricing.as_ref(),
    };
    let products = selection.records.len();
    let status = RunStatus::success(Utc::now(), files, products);
    let published =
        feedbuilder_artifacts::publish(&config.out_dir, &selection.records, &opts, &status)?;

    Ok(RunResult {
        files,
        skipped_files,
        candidates,
        incomplete,
        rejected: selection.rejected,
        truncated: selection.truncated,
        products,
        published,
        status,
        elapsed: start.elapsed(),
    })
}

/// Message of a parse error without its `parse error:` prefix.
fn parse_detail(e: FeedBuilderError) -> String {
    match e {
        FeedBuilderError::Parse { message } => message,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use feedbuilder_artifacts::{CATALOG_PREVIEW_CSV, FEED_XML, LAST_RUN_TXT, PING_TXT};
    use feedbuilder_shared::SchemaConfig;

    /// In-memory source that records when it is dropped.
    struct MemorySource {
        files: HashMap<String, Vec<u8>>,
        dropped: Rc<Cell<bool>>,
    }

    impl RemoteSource for MemorySource {
        fn describe(&self) -> String {
            "memory".into()
        }

        fn retrieve(&mut self, name: &str) -> Result<Vec<u8>> {
            self.files
                .get(name)
                .cloned()
                .ok_or_else(|| FeedBuilderError::connection(format!("550 {name}")))
        }
    }

    impl Drop for MemorySource {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    fn source(files: &[(&str, &str)]) -> MemorySource {
        MemorySource {
            files: files
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
            dropped: Rc::new(Cell::new(false)),
        }
    }

    /// Plain four-column schema with filters and pricing off.
    fn config(base: &Path, list: &[&str]) -> RunConfig {
        std::fs::write(base.join("products_list.txt"), list.join("\n")).unwrap();

        let mut app = AppConfig::default();
        app.schema = SchemaConfig {
            item_tag: "item".into(),
            fields: vec!["id".into(), "name".into(), "price".into(), "stock".into()],
            required: vec!["id".into(), "name".into(), "price".into(), "stock".into()],
        };
        app.filters.enabled = false;
        app.pricing.enabled = false;
        app.output.review_columns = false;
        app.output.light_csv = false;

        RunConfig::new(app, base.to_path_buf())
    }

    fn read(config: &RunConfig, name: &str) -> String {
        std::fs::read_to_string(config.out_dir.join(name)).unwrap()
    }

    const WIDGET: &str = r#"<?xml version="1.0"?>
<items>
  <item><id>123</id><name>Widget</name><price>9.99</price><stock>5</stock></item>
</items>"#;

    #[test]
    fn single_item_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), &["a.xml"]);

        let result = run_feed(&config, || Ok(source(&[("a.xml", WIDGET)])), &SilentProgress)
            .unwrap();

        assert_eq!(result.files, 1);
        assert_eq!(result.products, 1);
        assert_eq!(read(&config, CATALOG_PREVIEW_CSV), "id,name,price,stock\n123,Widget,9.99,5\n");
        assert!(read(&config, FEED_XML).contains(
            "<item><id>123</id><name>Widget</name><price>9.99</price><stock>5</stock></item>"
        ));
        assert!(read(&config, LAST_RUN_TXT).ends_with(" ok files=1 products=1\n"));
        assert_eq!(read(&config, PING_TXT), "ok");
    }

    #[test]
    fn rows_and_items_match_complete_records() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), &["a.xml", "b.xml"]);
        let a = r#"<items>
  <item><id>1</id><name>A</name><price>1</price><stock>1</stock></item>
  <item><id>2</id><name>B</name><price>2</price></item>
</items>"#;
        let b = r#"<items>
  <item><id>3</id><name>C</name><price>3</price><stock>3</stock></item>
  <item><id>4</id><name></name><price>4</price><stock>4</stock></item>
  <item><id>5</id><name>E</name><price>5</price><stock>5</stock></item>
</items>"#;

        let result = run_feed(
            &config,
            || Ok(source(&[("a.xml", a), ("b.xml", b)])),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(result.candidates, 5);
        assert_eq!(result.incomplete, 2);
        assert_eq!(result.products, 3);

        let csv = read(&config, CATALOG_PREVIEW_CSV);
        let feed = read(&config, FEED_XML);
        assert_eq!(csv.lines().count() - 1, 3);
        assert_eq!(feed.matches("<item>").count(), 3);
    }

    #[test]
    fn empty_document_publishes_header_only() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), &["a.xml"]);

        let result = run_feed(&config, || Ok(source(&[("a.xml", "<items/>")])), &SilentProgress)
            .unwrap();

        assert_eq!(result.products, 0);
        assert_eq!(read(&config, CATALOG_PREVIEW_CSV), "id,name,price,stock\n");
        assert!(read(&config, FEED_XML).ends_with("<catalog></catalog>"));
    }

    #[test]
    fn malformed_xml_keeps_previous_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), &["a.xml"]);

        run_feed(&config, || Ok(source(&[("a.xml", WIDGET)])), &SilentProgress).unwrap();
        let before = read(&config, CATALOG_PREVIEW_CSV);

        let err = run_feed(
            &config,
            || Ok(source(&[("a.xml", "<items><item><id>1</name></item></items>")])),
            &SilentProgress,
        )
        .unwrap_err();

        assert!(matches!(err, FeedBuilderError::Parse { .. }));
        assert!(err.to_string().contains("a.xml"));
        assert_eq!(read(&config, CATALOG_PREVIEW_CSV), before);
        assert!(read(&config, LAST_RUN_TXT).contains(" failed: parse error: a.xml"));
    }

    #[test]
    fn connection_failure_records_status() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), &["a.xml"]);
        std::fs::create_dir_all(&config.out_dir).unwrap();
        std::fs::write(config.out_dir.join(FEED_XML), "previous feed").unwrap();

        let err = run_feed(
            &config,
            || -> Result<MemorySource> { Err(FeedBuilderError::connection("refused")) },
            &SilentProgress,
        )
        .unwrap_err();

        assert!(matches!(err, FeedBuilderError::Connection(_)));
        assert_eq!(read(&config, FEED_XML), "previous feed");
        assert!(read(&config, LAST_RUN_TXT).ends_with(" failed: connection error: refused\n"));
        assert!(!config.out_dir.join(CATALOG_PREVIEW_CSV).exists());
    }

    #[test]
    fn missing_file_aborts_unless_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path(), &["missing.xml", "a.xml"]);

        let err = run_feed(&config, || Ok(source(&[("a.xml", WIDGET)])), &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, FeedBuilderError::Connection(_)));

        config.app.input.skip_failed_files = true;
        let result = run_feed(&config, || Ok(source(&[("a.xml", WIDGET)])), &SilentProgress)
            .unwrap();
        assert_eq!(result.files, 1);
        assert_eq!(result.skipped_files, 1);
    }

    #[test]
    fn unparseable_file_skipped_when_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path(), &["bad.xml", "a.xml"]);
        config.app.input.skip_failed_files = true;

        let result = run_feed(
            &config,
            || Ok(source(&[("bad.xml", "<items>"), ("a.xml", WIDGET)])),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(result.files, 1);
        assert_eq!(result.skipped_files, 1);
        assert_eq!(result.products, 1);
    }

    #[test]
    fn source_is_dropped_before_publishing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), &["a.xml"]);
        let src = source(&[("a.xml", WIDGET)]);
        let dropped = Rc::clone(&src.dropped);

        struct Probe(Rc<Cell<bool>>);
        impl ProgressReporter for Probe {
            fn phase(&self, name: &str) {
                if name == "Parsing" {
                    assert!(self.0.get(), "source still open while parsing");
                }
            }
            fn document_extracted(&self, _: &str, _: usize, _: usize, _: usize) {}
            fn done(&self, _: &RunResult) {}
        }

        run_feed(&config, move || Ok(src), &Probe(Rc::clone(&dropped))).unwrap();
        assert!(dropped.get());
    }

    #[test]
    fn record_failure_writes_marker_only() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("public");

        record_failure(&out, &FeedBuilderError::config("failed to parse feedbuilder.toml"));

        let marker = std::fs::read_to_string(out.join(LAST_RUN_TXT)).unwrap();
        assert!(marker.ends_with(" failed: config error: failed to parse feedbuilder.toml\n"));
        assert!(!out.join(PING_TXT).exists());
    }

    #[test]
    fn missing_list_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RunConfig::new(AppConfig::default(), tmp.path().to_path_buf());

        let err = run_feed(&config, || Ok(source(&[])), &SilentProgress).unwrap_err();
        assert!(matches!(err, FeedBuilderError::Io { .. }));
        assert!(read(&config, LAST_RUN_TXT).contains(" failed: "));
    }

    #[test]
    fn filters_and_pricing_apply_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("products_list.txt"), "feed.xml\n").unwrap();
        let config = RunConfig::new(AppConfig::default(), tmp.path().to_path_buf());
        let today = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let xml = format!(
            r#"<products>
  <product><id>1</id><name>Lamp</name><price>20</price><pvd>10</pvd><ean13>8412345678905</ean13>
    <stock>4</stock><image1>https://cdn.example.com/1.jpg</image1><date_upd>{today}</date_upd></product>
  <product><id>2</id><name>Cheap</name><price>2</price><pvd>1</pvd><ean13>8412345678912</ean13>
    <stock>9</stock><image1>https://cdn.example.com/2.jpg</image1></product>
</products>"#
        );

        let result = run_feed(
            &config,
            || Ok(source(&[("feed.xml", xml.as_str())])),
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(result.products, 1);
        assert_eq!(result.rejected, 1);

        let csv = read(&config, CATALOG_PREVIEW_CSV);
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("Keep?,id,name"));
        assert!(header.ends_with("sell_price,profit_eur,margin_pct,ok,avp_inc,avp_excl,diff_vs_avp,ge_avp,image_preview"));
        assert!(csv.contains("19.99,3.09,0.1547,TRUE,20.00,16.53,-0.0005,FALSE"));
        assert!(config.out_dir.join("catalog_light.csv").exists());
    }
}
