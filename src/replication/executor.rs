use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::replication::ReplicationError;

/// 实际并发数：min(8 × CPU 数, max_concurrency)，至少为 1
pub fn effective_concurrency(max_concurrency: usize) -> usize {
    (num_cpus::get() * 8).min(max_concurrency).max(1)
}

/// 一次有界并发执行的结果
#[derive(Debug)]
pub struct BoundedRun<R> {
    /// 已执行完的条目结果，顺序不固定
    pub outcomes: Vec<R>,
    /// 因取消而未开始的条目数
    pub abandoned: usize,
}

/// 以固定数量的 worker 执行所有条目
///
/// 条目经有界队列分发给 `concurrency` 个 worker，每个 worker 串行处理取到的条目，
/// 因此同时执行的条目不超过 `concurrency` 个。单个条目失败不影响其它条目，
/// 所有已开始的条目结束后才返回。取消后 worker 不再取新条目，正在执行的条目继续完成。
///
/// worker panic 时返回 `ReplicationError::Internal`。
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    cancel: &CancellationToken,
    worker: F,
) -> Result<BoundedRun<R>, ReplicationError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Ok(BoundedRun {
            outcomes: Vec::new(),
            abandoned: 0,
        });
    }

    let concurrency = concurrency.clamp(1, total);
    let (tx, rx) = async_channel::bounded::<T>(concurrency);

    let producer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for item in items {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let worker = Arc::new(worker);
    let workers: Vec<_> = (0..concurrency)
        .map(|_| {
            let rx = rx.clone();
            let cancel = cancel.clone();
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
                let mut outcomes = Vec::new();
                loop {
                    let item = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        item = rx.recv() => match item {
                            Ok(item) => item,
                            Err(_) => break,
                        },
                    };
                    outcomes.push(worker(item).await);
                }
                outcomes
            })
        })
        .collect();
    drop(rx);

    let mut outcomes = Vec::with_capacity(total);
    let mut panicked = None;
    for handle in workers {
        match handle.await {
            Ok(mut lane) => outcomes.append(&mut lane),
            Err(e) => {
                panicked.get_or_insert_with(|| format!("worker task failed: {}", e));
            }
        }
    }
    if let Err(e) = producer.await {
        panicked.get_or_insert_with(|| format!("producer task failed: {}", e));
    }

    if let Some(message) = panicked {
        return Err(ReplicationError::Internal(message));
    }

    let abandoned = total - outcomes.len();
    Ok(BoundedRun {
        outcomes,
        abandoned,
    })
}
