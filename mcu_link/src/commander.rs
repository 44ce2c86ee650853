/*!
High-level command dispatch.

[`Commander`] is the only surface application code needs: it turns robot
operations into frames and submits them at the tier each operation uses.
Cloning is cheap; every clone shares the same queue and mode state.
*/

use crate::commands::{self, BaseCommand, BaseControl, ControlFrame, ModeToggle, INIT_SEQUENCE};
use crate::error::{LinkError, Result};
use crate::frame::Frame;
use crate::queue::{Priority, PriorityQueue};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Commander {
    queue: Arc<PriorityQueue>,
    mode: Arc<Mutex<ModeToggle>>,
}

impl Commander {
    pub fn new(queue: Arc<PriorityQueue>) -> Self {
        Self {
            queue,
            mode: Arc::new(Mutex::new(ModeToggle::default())),
        }
    }

    pub fn queue(&self) -> &Arc<PriorityQueue> {
        &self.queue
    }

    fn with_mode<T>(&self, f: impl FnOnce(&mut ModeToggle) -> T) -> T {
        let mut mode = self.mode.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *mode)
    }

    /// Submit a pre-built frame
    pub fn submit(&self, priority: Priority, frame: Frame) {
        debug!("Queued {} priority frame [{}]", priority.as_str(), frame);
        self.queue.submit(priority, frame);
    }

    /// Queue a fixed control frame
    pub fn control(&self, priority: Priority, op: ControlFrame) {
        self.submit(priority, op.frame());
    }

    /// Drive command: velocity, angle and rotate mode on the low tier
    pub fn base_command(&self, cmd: BaseCommand) {
        self.queue.submit_all(Priority::Low, cmd.frames());
    }

    /// Numbered base-control operation on the high tier
    ///
    /// Unknown codes are rejected before anything is queued.
    pub fn base_control(&self, code: u8) -> Result<Vec<ControlFrame>> {
        let op = BaseControl::from_code(code)?;
        let ops = self.with_mode(|mode| op.frames(mode));
        self.queue
            .submit_all(Priority::High, ops.iter().map(|op| op.frame()));
        debug!("Base control {} -> {:?}", code, ops);
        Ok(ops)
    }

    /// Rotate the base to an absolute angle
    pub fn rotate_base(&self, angle: f32) {
        self.queue.submit(Priority::High, ControlFrame::RotateMode.frame());
        self.queue.submit(Priority::Mid, commands::rotate_to(angle));
    }

    /// Fire the ball pusher
    ///
    /// The MCU only supports blocking pushes, so `wait_for_completion = false`
    /// is refused.
    pub fn push_ball(&self, wait_for_completion: bool) -> Result<()> {
        if !wait_for_completion {
            return Err(LinkError::rejected("push ball requires wait_for_completion"));
        }
        self.queue.submit(Priority::Mid, ControlFrame::PushBall.frame());
        self.with_mode(ModeToggle::reset_to_manual);
        Ok(())
    }

    /// Queue the MCU configuration frames
    pub fn send_init_sequence(&self) {
        self.queue.submit_all(Priority::Mid, INIT_SEQUENCE);
    }
}
