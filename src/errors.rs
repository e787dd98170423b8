use std::error::Error;

/// Failure of a byte-level page read or write.
#[derive(Debug)]
pub enum DiskError {
    IOError(std::io::Error),
}

/// Failure to hand a request to the disk scheduler.
#[derive(Debug)]
pub enum ScheduleError {
    /// The background worker has exited; its queue is gone.
    WorkerGone,
    /// Derived error from the disk layer
    DiskError(DiskError),
}

impl std::fmt::Display for DiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskError::IOError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::WorkerGone => write!(f, "Disk scheduler worker is gone"),
            ScheduleError::DiskError(disk_error) => {
                write!(f, "Disk error: {}", disk_error)
            }
        }
    }
}

impl std::convert::From<std::io::Error> for DiskError {
    fn from(err: std::io::Error) -> Self {
        DiskError::IOError(err)
    }
}

impl std::convert::From<DiskError> for ScheduleError {
    fn from(err: DiskError) -> Self {
        ScheduleError::DiskError(err)
    }
}

impl Error for DiskError {}
impl Error for ScheduleError {}
