use log::{debug, info};
use serde::{Deserialize, Serialize};

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use allocation_table::{
    summarize, CrossTabConfig, CrossTabService, CrossTabSummary, ServiceError, Table,
};

/// The content of a view file: the configuration and its evaluation.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StoredView {
    pub config: CrossTabConfig,
    #[serde(default)]
    pub summary: Option<CrossTabSummary>,
}

/// Keeps each cross-tab view in a `<name>.view.json` file.
pub struct JsonViewStore {
    root: PathBuf,
}

impl JsonViewStore {
    pub fn new(root: PathBuf) -> JsonViewStore {
        JsonViewStore { root }
    }

    fn view_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.view.json", name))
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

fn backend<E: std::error::Error + Send + Sync + 'static>(e: E) -> ServiceError {
    ServiceError::Backend {
        source: Box::new(e),
    }
}

// The content of a view file, `None` when the view does not exist yet.
fn view_contents(p: &Path, read: io::Result<String>) -> Result<Option<String>, ServiceError> {
    match read {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("fetch_view: no view at {:?}", p);
            Ok(None)
        }
        Err(e) if is_transient(e.kind()) => Err(ServiceError::LimitReached {
            message: format!("{:?}: {}", p, e),
        }),
        Err(e) => Err(backend(e)),
    }
}

impl CrossTabService for JsonViewStore {
    fn fetch_view(&mut self, name: &str) -> Result<Option<CrossTabConfig>, ServiceError> {
        let p = self.view_path(name);
        let contents = match view_contents(&p, fs::read_to_string(&p))? {
            Some(s) => s,
            None => return Ok(None),
        };
        let stored: StoredView = serde_json::from_str(&contents).map_err(backend)?;
        Ok(Some(stored.config))
    }

    fn store_view(
        &mut self,
        name: &str,
        config: &CrossTabConfig,
        data: &Table,
    ) -> Result<(), ServiceError> {
        let stored = StoredView {
            config: config.clone(),
            summary: Some(summarize(config, data)),
        };
        let js = serde_json::to_string_pretty(&stored).map_err(backend)?;
        fs::create_dir_all(&self.root).map_err(backend)?;
        let p = self.view_path(name);
        fs::write(&p, js).map_err(backend)?;
        info!("Wrote view {:?} to {:?}", name, p);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocation_table::{build_cross_tab, upsert_cross_tab, Cell, CrossTabError};

    fn table() -> Table {
        Table {
            header: vec!["P%", "P", "User", "Role"]
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
            rows: vec![
                vec![
                    Cell::Number(0.8),
                    Cell::from("Java"),
                    Cell::from("jvonk"),
                    Cell::from("Student"),
                ],
                vec![
                    Cell::Number(0.2),
                    Cell::from("Rust"),
                    Cell::from("jvonk"),
                    Cell::from("Student"),
                ],
            ],
        }
    }

    #[test]
    fn store_then_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut views = JsonViewStore::new(dir.path().join("views"));
        assert_eq!(views.fetch_view("Summary").unwrap(), None);

        let t = table();
        let config = build_cross_tab("Summary-raw", &t, false);
        views.store_view("Summary", &config, &t).unwrap();
        assert_eq!(views.fetch_view("Summary").unwrap(), Some(config));
    }

    #[test]
    fn corrupted_view_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Summary.view.json"), "{ not json").unwrap();
        let mut views = JsonViewStore::new(dir.path().to_path_buf());
        assert!(matches!(
            views.fetch_view("Summary"),
            Err(ServiceError::Backend { .. })
        ));
    }

    #[test]
    fn read_failures() {
        let p = Path::new("Summary.view.json");
        let failed = |kind: ErrorKind| view_contents(p, Err(io::Error::new(kind, "read failed")));

        for kind in [ErrorKind::WouldBlock, ErrorKind::TimedOut, ErrorKind::Interrupted] {
            match failed(kind) {
                Err(ServiceError::LimitReached { message }) => {
                    assert!(message.contains("read failed"))
                }
                x => panic!("{:?}: expected a limit, got {:?}", kind, x),
            }
        }
        assert!(matches!(failed(ErrorKind::NotFound), Ok(None)));
        assert!(matches!(
            failed(ErrorKind::PermissionDenied),
            Err(ServiceError::Backend { .. })
        ));
        assert_eq!(
            view_contents(p, Ok("{}".to_string())).unwrap(),
            Some("{}".to_string())
        );
    }

    #[test]
    fn transient_read_is_quota_exceeded() {
        struct Flaky;

        impl CrossTabService for Flaky {
            fn fetch_view(&mut self, name: &str) -> Result<Option<CrossTabConfig>, ServiceError> {
                let read = Err(io::Error::new(ErrorKind::TimedOut, "busy"));
                view_contents(Path::new(name), read).map(|_| None)
            }

            fn store_view(
                &mut self,
                _name: &str,
                _config: &CrossTabConfig,
                _data: &Table,
            ) -> Result<(), ServiceError> {
                panic!("nothing is stored after a limit")
            }
        }

        let res = upsert_cross_tab(&mut Flaky, "Summary", "Summary-raw", &table(), false);
        assert!(matches!(res, Err(CrossTabError::QuotaExceeded { .. })));
    }
}
