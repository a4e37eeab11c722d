// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::{
    future::Future,
    thread,
    time::{Duration, Instant},
};

const TIMEOUT: Duration = Duration::from_secs(10);
const FIRST_TICK: Duration = Duration::from_millis(5);
const MAX_TICK: Duration = Duration::from_millis(100);

/// Polls the predicate with backoff until it holds. Panics with error_msg on timeout.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + TIMEOUT;
    let mut tick = FIRST_TICK;

    while !predicate() {
        assert!(Instant::now() < deadline, "{}", error_msg);
        thread::sleep(tick);
        tick = (tick * 2).min(MAX_TICK);
    }
}

/// The async version of eventually. Sleeps on the runtime instead of blocking the thread.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + TIMEOUT;
    let mut tick = FIRST_TICK;

    while !predicate().await {
        assert!(Instant::now() < deadline, "{}", error_msg);
        tokio::time::sleep(tick).await;
        tick = (tick * 2).min(MAX_TICK);
    }
}
