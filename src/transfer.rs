// src/transfer.rs

use crate::database::{Database, MeasurementFilter};
use crate::error::TransferError;
use crate::export::{export_to_csv, export_to_zip};
use crate::import::{import_from_zip, ImportSummary};

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub enum TransferJob {
    ExportZip { dir: PathBuf, filter: MeasurementFilter },
    ExportCsv { dir: PathBuf },
    Import { archive: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Path of the written file, `None` when there was nothing to export.
    Exported(Option<PathBuf>),
    Imported(ImportSummary),
}

/// One export or import running on its own thread with its own database
/// connection, so large archives don't stall the UI.
pub struct TransferTask {
    result: Receiver<Result<TransferOutcome, TransferError>>,
}

impl TransferTask {
    pub fn spawn(database: PathBuf, job: TransferJob) -> Self {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            debug!("Transfer started: {job:?}");
            let result = run_job(&database, job);
            if let Err(e) = &result {
                error!("Transfer failed: {e}");
            }
            let _ = tx.send(result);
        });
        Self { result: rx }
    }

    /// The result once the job is done. A thread that died without
    /// reporting counts as [`TransferError::Aborted`].
    pub fn try_finish(&self) -> Option<Result<TransferOutcome, TransferError>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransferError::Aborted)),
        }
    }

    pub fn wait(&self, timeout: Duration) -> Option<Result<TransferOutcome, TransferError>> {
        self.result.recv_timeout(timeout).ok()
    }
}

fn run_job(database: &Path, job: TransferJob) -> Result<TransferOutcome, TransferError> {
    let db = Database::open(database)?;
    Ok(match job {
        TransferJob::ExportZip { dir, filter } => TransferOutcome::Exported(export_to_zip(&db, &dir, &filter)?),
        TransferJob::ExportCsv { dir } => TransferOutcome::Exported(export_to_csv(&db, &dir)?),
        TransferJob::Import { archive } => TransferOutcome::Imported(import_from_zip(&db, &archive)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::sample;
    use crate::error::ImportError;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn export_then_import_on_worker_threads() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("measurements.db");
        let db = Database::open(&database).unwrap();
        db.save_measurement(&sample(Some("a"), 1.0, "2024-05-01 08:00:00")).unwrap();
        db.save_measurement(&sample(Some("b"), 2.0, "2024-05-02 08:00:00")).unwrap();

        let export = TransferTask::spawn(
            database.clone(),
            TransferJob::ExportZip {
                dir: dir.path().join("out"),
                filter: MeasurementFilter::default(),
            },
        );
        let archive = match export.wait(WAIT).unwrap().unwrap() {
            TransferOutcome::Exported(Some(path)) => path,
            other => panic!("unexpected {other:?}"),
        };

        let import = TransferTask::spawn(database, TransferJob::Import { archive });
        assert_eq!(
            import.wait(WAIT).unwrap().unwrap(),
            TransferOutcome::Imported(ImportSummary {
                succeeded: 2,
                failed: 0
            })
        );
        assert_eq!(db.count_measurements(&MeasurementFilter::default()).unwrap(), 4);
    }

    #[test]
    fn empty_export_reports_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let task = TransferTask::spawn(
            dir.path().join("measurements.db"),
            TransferJob::ExportCsv {
                dir: dir.path().join("out"),
            },
        );
        assert_eq!(task.wait(WAIT).unwrap().unwrap(), TransferOutcome::Exported(None));
    }

    #[test]
    fn failures_come_back_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let task = TransferTask::spawn(
            dir.path().join("measurements.db"),
            TransferJob::Import {
                archive: dir.path().join("missing.zip"),
            },
        );
        assert!(matches!(
            task.wait(WAIT).unwrap(),
            Err(TransferError::Import(ImportError::Io(_)))
        ));
    }
}
