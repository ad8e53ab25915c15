/*
 * SPDX-FileCopyrightText: 2024 Relay Service Contributors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Background purge ticker (§4.2): periodically sweeps expired queue
//! entries so a never-reconnecting recipient's backlog doesn't linger
//! past `message_retention`.

use tokio::sync::watch;
use trc::IntoErr;

use crate::Server;

impl Server {
    /// Runs until `shutdown` reports `true`. Ticks every `purge_interval`
    /// and sweeps the queue once per tick.
    pub async fn run_housekeeper(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.purge_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let purged = self.queue.purge_expired();
                    if purged > 0 {
                        trc::QueueEvent::Purged
                            .into_err()
                            .ctx("count", purged)
                            .emit();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
