// Periodic lease scan: keep the leases we still want, claim free ones, let go of the rest.

use std::collections::HashSet;
use tracing::{debug, error, warn};

use crate::domain::errors::StoreError;
use crate::use_cases::candidates::candidate_ids;
use crate::use_cases::context::EngineContext;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcquireReport {
    pub candidates: usize,
    pub acquired: usize,
    pub renewed: usize,
    pub lost: usize,
    pub released: usize,
}

pub struct LockAcquirer {
    ctx: EngineContext,
    include_offline: bool,
}

impl LockAcquirer {
    pub fn new(ctx: EngineContext, include_offline: bool) -> Self {
        Self {
            ctx,
            include_offline,
        }
    }

    // Idempotent; running it twice in a row changes nothing the second time.
    // A failed candidate scan skips the whole cycle.
    pub async fn run_pass(&self) -> Result<AcquireReport, StoreError> {
        let presence = self.ctx.presence.snapshot();
        let candidates =
            candidate_ids(&self.ctx.repository, &presence, self.include_offline).await?;
        let mut report = AcquireReport {
            candidates: candidates.len(),
            ..AcquireReport::default()
        };

        let tracked: HashSet<String> = self.ctx.locks.tracked_ids().await.into_iter().collect();
        for id in &tracked {
            if candidates.contains(id) {
                self.keep(id, &mut report).await;
            } else {
                self.let_go(id, &mut report).await;
            }
        }

        for id in candidates.iter().filter(|id| !tracked.contains(*id)) {
            match self.ctx.locks.acquire(id).await {
                Ok(true) => self.adopt(id, &mut report).await,
                // Held by another live process.
                Ok(false) => {}
                Err(err) => warn!(generator_id = %id, error = %err, "lease acquire failed"),
            }
        }

        debug!(
            candidates = report.candidates,
            acquired = report.acquired,
            renewed = report.renewed,
            lost = report.lost,
            released = report.released,
            "lease scan finished"
        );
        Ok(report)
    }

    async fn keep(&self, id: &str, report: &mut AcquireReport) {
        match self.ctx.locks.renew(id).await {
            Ok(true) => report.renewed += 1,
            Ok(false) => {
                // Someone else owns it now; our copy is stale and must not be written back.
                self.ctx.cache.invalidate(id).await;
                report.lost += 1;
                warn!(generator_id = %id, "lease lost");
            }
            Err(err) => warn!(generator_id = %id, error = %err, "lease renewal failed"),
        }
    }

    async fn let_go(&self, id: &str, report: &mut AcquireReport) {
        if let Err(err) = self.ctx.cache.flush_ids(&[id.to_string()]).await {
            error!(generator_id = %id, error = %err, "failed to save generator before release");
        }
        self.ctx.cache.invalidate(id).await;
        match self.ctx.locks.release(id).await {
            Ok(_) => report.released += 1,
            Err(err) => warn!(generator_id = %id, error = %err, "lease release failed; it will expire"),
        }
    }

    async fn adopt(&self, id: &str, report: &mut AcquireReport) {
        match self.ctx.cache.load(id).await {
            Ok(Some(_)) => report.acquired += 1,
            Ok(None) => {
                // Index entry without an instance record.
                self.give_back(id).await;
            }
            Err(err) => {
                error!(generator_id = %id, error = %err, "failed to load generator after acquire");
                self.give_back(id).await;
            }
        }
    }

    async fn give_back(&self, id: &str) {
        if let Err(err) = self.ctx.locks.release(id).await {
            warn!(generator_id = %id, error = %err, "lease release failed; it will expire");
        }
    }
}
