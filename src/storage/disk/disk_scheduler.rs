use std::io::{Read, Seek, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use oneshot::OneshotSender;

use crate::errors::{DiskError, ScheduleError};
use crate::storage::disk::disk_manager::DiskManager;
use crate::storage::PageId;

/// A single page I/O operation served by the background worker.
pub enum DiskRequest {
    /// Loans `buf` to the worker; it comes back filled through `done`.
    Read {
        page_id: PageId,
        buf: Box<[u8]>,
        done: OneshotSender<Box<[u8]>>,
    },
    /// Carries a snapshot of the page bytes; `done` signals success.
    Write {
        page_id: PageId,
        data: Box<[u8]>,
        done: OneshotSender<bool>,
    },
}

/// Serializes page I/O on a single background thread.
///
/// Requests flow through an unbounded FIFO and are served in enqueue
/// order. The queue carries `Option<DiskRequest>` where `None` is the
/// shutdown sentinel: dropping the scheduler enqueues it and joins the
/// worker, so everything scheduled before the drop is served first.
pub struct DiskScheduler<R: Read + Write + Seek + Send + 'static> {
    disk: Arc<Mutex<DiskManager<R>>>,
    queue: Sender<Option<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl<R: Read + Write + Seek + Send + 'static> DiskScheduler<R> {
    pub fn new(disk: DiskManager<R>) -> Self {
        let disk = Arc::new(Mutex::new(disk));
        let (queue, requests) = mpsc::channel();

        let worker = Some(Self::spawn_worker(Arc::clone(&disk), requests));

        DiskScheduler {
            disk,
            queue,
            worker,
        }
    }

    /// Hands a request to the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<(), ScheduleError> {
        self.queue
            .send(Some(request))
            .map_err(|_| ScheduleError::WorkerGone)
    }

    /// Grows the backing stream to cover pages `[0, npages)`. Cheap
    /// metadata work, executed on the caller's thread rather than queued.
    pub fn increase_disk_space(&self, npages: u32) -> Result<(), DiskError> {
        self.disk
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .increase_disk_space(npages)
    }

    /// Releases the on-disk page. Executed on the caller's thread.
    pub fn deallocate_page(&self, page_id: PageId) {
        self.disk
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deallocate_page(page_id);
    }

    fn spawn_worker(
        disk: Arc<Mutex<DiskManager<R>>>,
        requests: Receiver<Option<DiskRequest>>,
    ) -> JoinHandle<()> {
        std::thread::spawn(move || {
            while let Ok(Some(request)) = requests.recv() {
                let mut disk = disk.lock().unwrap_or_else(PoisonError::into_inner);

                match request {
                    DiskRequest::Read {
                        page_id,
                        mut buf,
                        done,
                    } => match disk.read_page(page_id, &mut buf) {
                        Ok(()) => {
                            let _ = done.send(buf);
                        }
                        // Dropping `done` makes the waiting thread abort.
                        Err(err) => log::error!("read of page {page_id} failed: {err}"),
                    },
                    DiskRequest::Write {
                        page_id,
                        data,
                        done,
                    } => {
                        let result = disk.write_page(page_id, &data);
                        if let Err(err) = &result {
                            log::error!("write of page {page_id} failed: {err}");
                        }
                        let _ = done.send(result.is_ok());
                    }
                }
            }

            log::debug!("disk scheduler queue drained, worker exiting");
        })
    }
}

impl<R: Read + Write + Seek + Send + 'static> Drop for DiskScheduler<R> {
    fn drop(&mut self) {
        let _ = self.queue.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
