use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::delivery;
use crate::dispatcher::Dispatcher;
use crate::store::format_utc;
use crate::types::ClaimRequest;
use crate::worker;

/// Owns the delivery loop, its bounded worker pool, and the retention sweep.
/// Construct one per process, hand out [`Dispatcher`] handles, then call
/// [`start`](Self::start).
///
/// The due-queue is the store itself: releases happen by polling for rows
/// whose `next_attempt_at` has arrived, with a [`Notify`] nudge so freshly
/// emitted events don't wait out the poll interval. The first poll doubles
/// as the startup recovery scan, so no timer has to survive a crash.
pub struct DeliveryService {
    pool: SqlitePool,
    config: DeliveryConfig,
    client: reqwest::Client,
    wake: Arc<Notify>,
    worker_id: String,
}

impl DeliveryService {
    pub fn new(pool: SqlitePool, config: DeliveryConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            pool,
            config,
            client: worker::http_client()?,
            wake: Arc::new(Notify::new()),
            worker_id: format!("notifier-{}", Uuid::new_v4()),
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.pool.clone(), self.wake.clone())
    }

    pub fn start(self) -> Vec<JoinHandle<()>> {
        let retention = tokio::spawn(retention_loop(self.pool.clone(), self.config.clone()));
        let deliveries = tokio::spawn(self.delivery_loop());
        vec![deliveries, retention]
    }

    async fn delivery_loop(self) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        tracing::info!(worker_id = %self.worker_id, "delivery loop started");

        loop {
            let req = ClaimRequest {
                limit: self.config.batch_limit,
                claim_ms: self.config.claim_ms,
                worker_id: self.worker_id.clone(),
            };

            let claimed = match delivery::claim_due(&self.pool, &req).await {
                Ok(claimed) => claimed,
                Err(err) => {
                    tracing::error!(error = %err, "claiming due deliveries failed");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };

            let claimed_len = claimed.len();
            for item in claimed {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    return;
                };
                let client = self.client.clone();
                let pool = self.pool.clone();
                let config = self.config.clone();
                let worker_id = self.worker_id.clone();
                tokio::spawn(async move {
                    worker::attempt_delivery(&client, &pool, &config, &worker_id, &item).await;
                    drop(permit);
                });
            }

            // A full batch suggests more rows are already due.
            if claimed_len as i64 >= self.config.batch_limit {
                continue;
            }

            tokio::select! {
                () = self.wake.notified() => {}
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// Lower-priority housekeeping on its own task so it never competes with
/// live delivery attempts for the worker pool.
async fn retention_loop(pool: SqlitePool, config: DeliveryConfig) {
    let interval = Duration::from_secs(config.retention_interval_secs);

    loop {
        tokio::time::sleep(interval).await;

        let cutoff = format_utc(
            Utc::now() - chrono::Duration::hours(config.retention_max_age_hours as i64),
        );
        match delivery::delete_older_than(&pool, &cutoff).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "pruned terminal deliveries"),
            Err(err) => tracing::error!(error = %err, "retention sweep failed"),
        }
    }
}
