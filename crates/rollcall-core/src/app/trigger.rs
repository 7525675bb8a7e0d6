//! AttendanceTrigger - 毎分の tick とウィンドウ判定
//!
//! tick ごとに現在のローカル時刻を見て、ウィンドウの内側なら
//! MarkingOrchestrator を 1 サイクル回す。境界ちょうどの tick は含めない。

use std::sync::Arc;

use tracing::{debug, error};

use crate::app::orchestrator::{CycleReport, MarkingOrchestrator};
use crate::domain::ActionWindow;
use crate::ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    OutsideWindow,
    Ran(CycleReport),
    /// The eligibility query failed; logged, next tick tries again.
    Aborted,
}

pub struct AttendanceTrigger {
    window: ActionWindow,
    orchestrator: Arc<MarkingOrchestrator>,
    clock: Arc<dyn Clock>,
}

impl AttendanceTrigger {
    pub fn new(
        window: ActionWindow,
        orchestrator: Arc<MarkingOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            window,
            orchestrator,
            clock,
        }
    }

    pub fn window(&self) -> ActionWindow {
        self.window
    }

    pub async fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        if !self.window.contains(now.time()) {
            debug!(%now, window = %self.window, "outside action window");
            return TickOutcome::OutsideWindow;
        }

        match self.orchestrator.run_cycle(now.date()).await {
            Ok(report) => TickOutcome::Ran(report),
            Err(e) => {
                error!(error = %e, kind = ?e.kind(), "marking cycle aborted");
                TickOutcome::Aborted
            }
        }
    }
}
