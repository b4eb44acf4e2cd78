// SPDX-License-Identifier: CEPL-1.0
//! Frame ordering: the per-frame submission record and the state machines
//! that keep the frame protocol in order.

use std::fmt;

use thiserror::Error;

/// A semaphore role in the frame chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncPoint {
    /// Signalled by image acquisition rather than a submission.
    ImageAvailable,
    PrepassDone,
    LightCullDone,
    RenderDone,
    OverlayDone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Prepass,
    LightCull,
    Geometry,
    Overlay,
    Present,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [
        Stage::Prepass,
        Stage::LightCull,
        Stage::Geometry,
        Stage::Overlay,
        Stage::Present,
    ];

    /// Semaphores a stage must wait on.
    pub fn required_waits(self) -> &'static [SyncPoint] {
        match self {
            Stage::Prepass => &[],
            Stage::LightCull => &[SyncPoint::PrepassDone],
            Stage::Geometry => &[SyncPoint::ImageAvailable, SyncPoint::LightCullDone],
            Stage::Overlay => &[SyncPoint::RenderDone],
            Stage::Present => &[SyncPoint::OverlayDone],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub stage: Stage,
    pub waits: Vec<SyncPoint>,
    pub signals: Vec<SyncPoint>,
    /// Whether this submission signals the CPU-visible render fence.
    pub fence: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("{0} was never submitted")]
    Missing(Stage),
    #[error("{stage} submitted after {after}")]
    OutOfOrder { stage: Stage, after: Stage },
    #[error("{stage} does not wait on {point:?}")]
    MissingWait { stage: Stage, point: SyncPoint },
    #[error("{stage} waits on {point:?}, which nothing earlier signals")]
    Unsignalled { stage: Stage, point: SyncPoint },
    #[error("{0} submissions signal the render fence, expected exactly one")]
    FenceCount(usize),
    #[error("render fence signalled by {0}, expected the overlay submission")]
    FenceStage(Stage),
}

/// Everything submitted during one frame, in submission order.
#[derive(Clone, Debug, Default)]
pub struct FrameGraph {
    submissions: Vec<Submission>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.submissions.clear();
    }

    pub fn record(&mut self, stage: Stage, waits: &[SyncPoint], signals: &[SyncPoint], fence: bool) {
        self.submissions.push(Submission {
            stage,
            waits: waits.to_vec(),
            signals: signals.to_vec(),
            fence,
        });
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Checks prepass → cull → geometry → overlay → present and the
    /// single-fence rule.
    pub fn validate(&self) -> Result<(), ChainError> {
        let mut prev: Option<Stage> = None;
        for s in &self.submissions {
            if let Some(after) = prev {
                if s.stage <= after {
                    return Err(ChainError::OutOfOrder {
                        stage: s.stage,
                        after,
                    });
                }
            }
            prev = Some(s.stage);
        }
        for stage in Stage::ORDER {
            if !self.submissions.iter().any(|s| s.stage == stage) {
                return Err(ChainError::Missing(stage));
            }
        }

        let mut signalled = vec![SyncPoint::ImageAvailable];
        for s in &self.submissions {
            for &point in s.stage.required_waits() {
                if !s.waits.contains(&point) {
                    return Err(ChainError::MissingWait {
                        stage: s.stage,
                        point,
                    });
                }
            }
            if let Some(&point) = s.waits.iter().find(|p| !signalled.contains(p)) {
                return Err(ChainError::Unsignalled {
                    stage: s.stage,
                    point,
                });
            }
            signalled.extend_from_slice(&s.signals);
        }

        let fenced: Vec<_> = self.submissions.iter().filter(|s| s.fence).collect();
        match fenced.as_slice() {
            [only] if only.stage == Stage::Overlay => Ok(()),
            [only] => Err(ChainError::FenceStage(only.stage)),
            other => Err(ChainError::FenceCount(other.len())),
        }
    }
}

/// Where the render thread is within one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Acquired,
    Recording,
    Recorded,
    PrepassSubmitted,
    CullSubmitted,
    GeometrySubmitted,
    OverlaySubmitted,
}

impl FrameState {
    fn successor(self) -> FrameState {
        match self {
            FrameState::Idle => FrameState::Acquired,
            FrameState::Acquired => FrameState::Recording,
            FrameState::Recording => FrameState::Recorded,
            FrameState::Recorded => FrameState::PrepassSubmitted,
            FrameState::PrepassSubmitted => FrameState::CullSubmitted,
            FrameState::CullSubmitted => FrameState::GeometrySubmitted,
            FrameState::GeometrySubmitted => FrameState::OverlaySubmitted,
            FrameState::OverlaySubmitted => FrameState::Idle,
        }
    }

    /// Moves to `to`, which must directly follow the current state.
    ///
    /// # Panics
    /// On any out-of-order step.
    #[track_caller]
    pub fn advance(&mut self, to: FrameState) {
        assert_eq!(
            self.successor(),
            to,
            "frame protocol violated: {self:?} -> {to:?}"
        );
        *self = to;
    }

    #[track_caller]
    pub fn expect(&self, state: FrameState) {
        assert_eq!(*self, state, "frame protocol violated: expected {state:?}");
    }
}

/// Lifecycle of the swapchain-dependent resource set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwapchainState {
    #[default]
    Uninitialised,
    Built {
        generation: u32,
    },
    Rebuilding {
        generation: u32,
    },
}

impl SwapchainState {
    #[track_caller]
    pub fn begin_rebuild(&mut self) {
        match *self {
            SwapchainState::Built { generation } => *self = SwapchainState::Rebuilding { generation },
            other => panic!("cannot rebuild swapchain in state {other:?}"),
        }
    }

    #[track_caller]
    pub fn finish_build(&mut self) {
        *self = match *self {
            SwapchainState::Uninitialised => SwapchainState::Built { generation: 0 },
            SwapchainState::Rebuilding { generation } => SwapchainState::Built {
                generation: generation + 1,
            },
            other => panic!("swapchain build finished in state {other:?}"),
        };
    }

    pub fn is_built(&self) -> bool {
        matches!(self, SwapchainState::Built { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SyncPoint::*;

    fn full_chain() -> FrameGraph {
        let mut g = FrameGraph::new();
        g.record(Stage::Prepass, &[], &[PrepassDone], false);
        g.record(Stage::LightCull, &[PrepassDone], &[LightCullDone], false);
        g.record(Stage::Geometry, &[ImageAvailable, LightCullDone], &[RenderDone], false);
        g.record(Stage::Overlay, &[RenderDone], &[OverlayDone], true);
        g.record(Stage::Present, &[OverlayDone], &[], false);
        g
    }

    #[test]
    fn well_formed_chain_validates() {
        assert_eq!(full_chain().validate(), Ok(()));
    }

    #[test]
    fn geometry_must_wait_on_culling() {
        let mut g = FrameGraph::new();
        g.record(Stage::Prepass, &[], &[PrepassDone], false);
        g.record(Stage::LightCull, &[PrepassDone], &[LightCullDone], false);
        g.record(Stage::Geometry, &[ImageAvailable], &[RenderDone], false);
        g.record(Stage::Overlay, &[RenderDone], &[OverlayDone], true);
        g.record(Stage::Present, &[OverlayDone], &[], false);
        assert_eq!(
            g.validate(),
            Err(ChainError::MissingWait {
                stage: Stage::Geometry,
                point: LightCullDone
            })
        );
    }

    #[test]
    fn overlay_must_wait_on_render_done() {
        let mut g = full_chain();
        g.submissions[3].waits.clear();
        assert_eq!(
            g.validate(),
            Err(ChainError::MissingWait {
                stage: Stage::Overlay,
                point: RenderDone
            })
        );
    }

    #[test]
    fn waiting_on_a_later_signal_is_rejected() {
        let mut g = full_chain();
        g.submissions[1].waits.push(RenderDone);
        assert_eq!(
            g.validate(),
            Err(ChainError::Unsignalled {
                stage: Stage::LightCull,
                point: RenderDone
            })
        );
    }

    #[test]
    fn stage_order_and_presence() {
        let mut g = full_chain();
        g.submissions.swap(0, 1);
        assert!(matches!(g.validate(), Err(ChainError::OutOfOrder { .. })));

        let mut g = full_chain();
        g.submissions.remove(4);
        assert_eq!(g.validate(), Err(ChainError::Missing(Stage::Present)));
    }

    #[test]
    fn exactly_one_fence_on_overlay() {
        let mut g = full_chain();
        g.submissions[2].fence = true;
        assert_eq!(g.validate(), Err(ChainError::FenceCount(2)));

        let mut g = full_chain();
        g.submissions[3].fence = false;
        g.submissions[0].fence = true;
        assert_eq!(g.validate(), Err(ChainError::FenceStage(Stage::Prepass)));
    }

    #[test]
    fn frame_state_cycles() {
        let mut s = FrameState::default();
        for to in [
            FrameState::Acquired,
            FrameState::Recording,
            FrameState::Recorded,
            FrameState::PrepassSubmitted,
            FrameState::CullSubmitted,
            FrameState::GeometrySubmitted,
            FrameState::OverlaySubmitted,
            FrameState::Idle,
        ] {
            s.advance(to);
        }
        assert_eq!(s, FrameState::Idle);
    }

    #[test]
    #[should_panic(expected = "frame protocol violated")]
    fn skipping_the_prepass_panics() {
        let mut s = FrameState::Recorded;
        s.advance(FrameState::CullSubmitted);
    }

    #[test]
    fn swapchain_generations() {
        let mut s = SwapchainState::default();
        assert!(!s.is_built());
        s.finish_build();
        assert_eq!(s, SwapchainState::Built { generation: 0 });
        s.begin_rebuild();
        assert!(!s.is_built());
        s.finish_build();
        assert_eq!(s, SwapchainState::Built { generation: 1 });
    }

    #[test]
    #[should_panic(expected = "cannot rebuild")]
    fn rebuild_before_build_panics() {
        SwapchainState::default().begin_rebuild();
    }
}
