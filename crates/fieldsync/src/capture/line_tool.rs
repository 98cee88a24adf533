//! Two-click cable drawing between existing point assets.
//!
//! `Idle` -> first point selected -> `AwaitingEndNode` -> second point
//! selected -> endpoints returned and back to `Idle`. Re-activating the tool or
//! cancelling drops a half-built line without producing anything.

use fieldsync_api::{Asset, AssetId, Geometry, Position};
use tracing::debug;

use super::CaptureError;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LineToolState {
    #[default]
    Idle,
    AwaitingEndNode {
        start_id: AssetId,
        start: Position,
    },
}

/// The two nodes a finished cable connects, in selection order
#[derive(Debug, Clone, PartialEq)]
pub struct CableEndpoints {
    pub from_id: AssetId,
    pub from: Position,
    pub to_id: AssetId,
    pub to: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineSelection {
    /// First node recorded, waiting for the second
    Started,
    /// The start node was selected again; nothing changed
    Ignored,
    Completed(CableEndpoints),
}

#[derive(Debug, Default)]
pub struct LineTool {
    state: LineToolState,
}

impl LineTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LineToolState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == LineToolState::Idle
    }

    /// Selecting the tool again starts over
    pub fn activate(&mut self) {
        self.reset("tool re-selected");
    }

    pub fn cancel(&mut self) {
        self.reset("cancelled");
    }

    fn reset(&mut self, reason: &str) {
        if !self.is_idle() {
            debug!("[LineTool] Discarding half-built cable: {}", reason);
        }
        self.state = LineToolState::Idle;
    }

    /// Feed a clicked asset into the tool. Only point assets can be cable ends.
    pub fn select(&mut self, node: &Asset) -> Result<LineSelection, CaptureError> {
        let Geometry::Point(position) = node.geometry else {
            return Err(CaptureError::NotAPoint(node.id.clone()));
        };

        match std::mem::take(&mut self.state) {
            LineToolState::Idle => {
                self.state = LineToolState::AwaitingEndNode {
                    start_id: node.id.clone(),
                    start: position,
                };
                Ok(LineSelection::Started)
            }
            LineToolState::AwaitingEndNode { start_id, start } if start_id == node.id => {
                self.state = LineToolState::AwaitingEndNode { start_id, start };
                Ok(LineSelection::Ignored)
            }
            LineToolState::AwaitingEndNode { start_id, start } => {
                Ok(LineSelection::Completed(CableEndpoints {
                    from_id: start_id,
                    from: start,
                    to_id: node.id.clone(),
                    to: position,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_cable, sample_pole};

    #[test]
    fn test_two_selections_complete_a_cable() {
        let a = sample_pole(1, "A", false);
        let b = sample_pole(2, "B", false);
        let mut tool = LineTool::new();

        assert_eq!(tool.select(&a).unwrap(), LineSelection::Started);
        assert!(!tool.is_idle());

        let LineSelection::Completed(endpoints) = tool.select(&b).unwrap() else {
            panic!("second selection should complete the cable");
        };
        assert_eq!(endpoints.from_id, a.id);
        assert_eq!(endpoints.to_id, b.id);
        assert_eq!(a.geometry.positions(), vec![endpoints.from]);
        assert_eq!(b.geometry.positions(), vec![endpoints.to]);
        assert!(tool.is_idle());
    }

    #[test]
    fn test_reselecting_start_node_is_ignored() {
        let a = sample_pole(1, "A", false);
        let mut tool = LineTool::new();
        tool.select(&a).unwrap();

        assert_eq!(tool.select(&a).unwrap(), LineSelection::Ignored);
        assert!(matches!(
            tool.state(),
            LineToolState::AwaitingEndNode { start_id, .. } if *start_id == a.id
        ));
    }

    #[test]
    fn test_cancel_and_reactivate_reset_to_idle() {
        let a = sample_pole(1, "A", false);
        let mut tool = LineTool::new();

        tool.select(&a).unwrap();
        tool.cancel();
        assert!(tool.is_idle());

        tool.select(&a).unwrap();
        tool.activate();
        assert!(tool.is_idle());
    }

    #[test]
    fn test_lines_cannot_be_cable_ends() {
        let cable = sample_cable("c-1", 1, 2, false);
        let mut tool = LineTool::new();

        let err = tool.select(&cable).unwrap_err();
        assert!(matches!(err, CaptureError::NotAPoint(_)));
        assert!(tool.is_idle());
    }
}
