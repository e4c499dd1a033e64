use lebai_rpc::{GripperCommand, JointPose, MotionParameters};
use tokio::sync::broadcast;
use tracing::info;

/// Everything a UI needs to render the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    /// Human-readable status line.
    Status(String),
    /// Status line of the teaching area.
    TeachingStatus(String),
    Joints(JointPose),
    Gripper(GripperCommand),
    Motion(MotionParameters),
    /// Manual controls must be locked while true.
    TeachingMode(bool),
    Busy(bool),
}

/// Fan-out of [`PanelEvent`]s. Publishing never blocks and never fails; slow subscribers
/// lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PanelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PanelEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("[STATUS] {}", message);
        self.publish(PanelEvent::Status(message));
    }

    pub fn teaching_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("[TEACH] {}", message);
        self.publish(PanelEvent::TeachingStatus(message));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
