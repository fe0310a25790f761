//! Row streaming between table functions and the host

use super::query::QueryContext;
use anyhow::Result;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One result row: column name to value
pub type Row = Map<String, Value>;

const ROW_BUFFER: usize = 256;

/// Sending half of a row stream.
///
/// `send` reports whether the producer should keep going; once the limit is
/// reached or the receiver is gone it returns `false` and `is_done` stays true.
#[derive(Clone)]
pub struct RowSender {
    tx: mpsc::Sender<Row>,
    limit: Option<usize>,
    sent: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl RowSender {
    pub fn channel(limit: Option<usize>) -> (Self, mpsc::Receiver<Row>) {
        let (tx, rx) = mpsc::channel(ROW_BUFFER);
        let sender = Self {
            tx,
            limit,
            sent: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (sender, rx)
    }

    pub fn for_context(ctx: &QueryContext) -> (Self, mpsc::Receiver<Row>) {
        Self::channel(ctx.limit)
    }

    /// Stream a row. Returns `false` when no more rows are wanted.
    pub async fn send(&self, row: Row) -> bool {
        if self.is_done() {
            return false;
        }

        if let Some(limit) = self.limit {
            // Claim a slot so concurrent senders never exceed the limit
            let claimed = self
                .sent
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < limit).then_some(n + 1)
                });
            if claimed.is_err() {
                return false;
            }
        } else {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }

        if self.tx.send(row).await.is_err() {
            tracing::debug!("Row receiver dropped, stopping");
            self.closed.store(true, Ordering::SeqCst);
            return false;
        }

        !self.is_done()
    }

    /// Whether the limit was reached or the receiver went away
    pub fn is_done(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) || self.tx.is_closed() {
            return true;
        }
        self.limit
            .map(|limit| self.sent.load(Ordering::SeqCst) >= limit)
            .unwrap_or(false)
    }

    pub fn rows_sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Rows still wanted, if limited
    pub fn rows_remaining(&self) -> Option<usize> {
        self.limit
            .map(|limit| limit.saturating_sub(self.sent.load(Ordering::SeqCst)))
    }
}

/// Drive a producer and collect everything it streams
pub async fn collect_rows<F>(producer: F, mut rx: mpsc::Receiver<Row>) -> Result<Vec<Row>>
where
    F: Future<Output = Result<()>>,
{
    let consumer = async {
        let mut rows = Vec::new();
        while let Some(row) = rx.recv().await {
            rows.push(row);
        }
        rows
    };

    let (result, rows) = tokio::join!(producer, consumer);
    result?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(n: i64) -> Row {
        let mut row = Row::new();
        row.insert("n".to_string(), json!(n));
        row
    }

    #[tokio::test]
    async fn test_limit_stops_sender() {
        let (tx, rx) = RowSender::channel(Some(2));
        let producer = async move {
            let mut attempts = 0;
            for n in 0..10 {
                attempts += 1;
                if !tx.send(row(n)).await {
                    break;
                }
            }
            assert_eq!(attempts, 2);
            assert!(tx.is_done());
            assert_eq!(tx.rows_remaining(), Some(0));
            Ok(())
        };

        let rows = collect_rows(producer, rx).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["n"], json!(1));
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_sender() {
        let (tx, rx) = RowSender::channel(None);
        drop(rx);
        assert!(tx.is_done());
        assert!(!tx.send(row(1)).await);
    }

    #[tokio::test]
    async fn test_unlimited_sender() {
        let (tx, rx) = RowSender::channel(None);
        let producer = async move {
            for n in 0..5 {
                assert!(tx.send(row(n)).await);
            }
            assert_eq!(tx.rows_remaining(), None);
            Ok(())
        };
        let rows = collect_rows(producer, rx).await.unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_zero_limit_is_done_immediately() {
        let (tx, _rx) = RowSender::channel(Some(0));
        assert!(tx.is_done());
        assert!(!tokio_test::block_on(tx.send(row(1))));
    }
}
