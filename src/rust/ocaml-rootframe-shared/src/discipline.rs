// The frame state machine: Unbegun -> Active -> (Extended) -> Ended
//
// Used live by the checked entrypoints, and offline when replaying a recorded trace. Frames that
// have ended are simply no longer on the stack.

use thiserror::Error;

use crate::abi::MAX_ROOTS;
use crate::frame_trace::{FrameEvent, FrameOp, FrameOpKind};

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DisciplineError {
    #[error("Frame #{0} is not active (already ended, never begun, or begun on another thread)")]
    NotActive(u64),

    #[error("Frame #{0} was begun while it was already active")]
    AlreadyActive(u64),

    #[error("Frame #{ended} ended while frame #{innermost} is still active inside it")]
    OutOfOrder { ended: u64, innermost: u64 },

    #[error("Frame #{0} has already been extended")]
    AlreadyExtended(u64),

    #[error("Frame #{extended} extended while frame #{innermost} is still active inside it")]
    NotInnermost { extended: u64, innermost: u64 },

    #[error("{roots} roots is not a valid count for {op:?}")]
    BadRootCount { op: FrameOpKind, roots: usize },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameState {
    Active,
    Extended,
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct ActiveFrame {
    serial: u64,
    state: FrameState,
    roots: usize,
}

#[derive(Debug, Default)]
pub struct FrameDiscipline {
    thread: u64,
    next_serial: u64,
    active: Vec<ActiveFrame>,
}

impl FrameDiscipline {
    pub fn new(thread: u64) -> FrameDiscipline {
        FrameDiscipline {
            thread,
            next_serial: 0,
            active: Vec::new(),
        }
    }

    pub fn thread(&self) -> u64 {
        self.thread
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn state(&self, serial: u64) -> Option<FrameState> {
        self.find(serial).map(|i| self.active[i].state)
    }

    pub fn innermost(&self) -> Option<u64> {
        self.active.last().map(|f| f.serial)
    }

    /// Number of slots registered by all currently active frames
    pub fn live_roots(&self) -> usize {
        self.active.iter().map(|f| f.roots).sum()
    }

    pub fn begin(&mut self, roots: usize) -> Result<FrameEvent, DisciplineError> {
        let event = FrameEvent {
            thread: self.thread,
            serial: self.next_serial,
            depth: self.depth() + 1,
            op: FrameOp::Begin { roots },
        };
        self.apply(&event)?;
        Ok(event)
    }

    pub fn extend(&mut self, serial: u64, roots: usize) -> Result<FrameEvent, DisciplineError> {
        self.apply_live(serial, FrameOp::Extend { roots })
    }

    pub fn local(&mut self, serial: u64, roots: usize) -> Result<FrameEvent, DisciplineError> {
        self.apply_live(serial, FrameOp::Local { roots })
    }

    pub fn drop_frame(&mut self, serial: u64) -> Result<FrameEvent, DisciplineError> {
        self.apply_live(serial, FrameOp::Drop)
    }

    pub fn return_frame(&mut self, serial: u64, value: u64) -> Result<FrameEvent, DisciplineError> {
        self.apply_live(serial, FrameOp::Return { value })
    }

    fn apply_live(&mut self, serial: u64, op: FrameOp) -> Result<FrameEvent, DisciplineError> {
        let event = FrameEvent {
            thread: self.thread,
            serial,
            depth: self.depth(),
            op,
        };
        self.apply(&event)?;
        Ok(event)
    }

    /// Validate an event against the current state and apply it. On error the state is unchanged.
    pub fn apply(&mut self, event: &FrameEvent) -> Result<(), DisciplineError> {
        let serial = event.serial;

        match event.op {
            FrameOp::Begin { roots } => {
                if roots > MAX_ROOTS {
                    return Err(DisciplineError::BadRootCount {
                        op: FrameOpKind::Begin,
                        roots,
                    });
                }
                if self.find(serial).is_some() {
                    return Err(DisciplineError::AlreadyActive(serial));
                }

                self.active.push(ActiveFrame {
                    serial,
                    state: FrameState::Active,
                    roots,
                });
                self.next_serial = self.next_serial.max(serial.saturating_add(1));
            }
            FrameOp::Extend { roots } | FrameOp::Local { roots } => {
                if roots == 0 || roots > MAX_ROOTS {
                    return Err(DisciplineError::BadRootCount {
                        op: event.op.kind(),
                        roots,
                    });
                }

                let index = self.find(serial).ok_or(DisciplineError::NotActive(serial))?;
                if let Some(innermost) = self.innermost().filter(|&i| i != serial) {
                    return Err(DisciplineError::NotInnermost {
                        extended: serial,
                        innermost,
                    });
                }

                let frame = &mut self.active[index];
                if frame.state == FrameState::Extended {
                    return Err(DisciplineError::AlreadyExtended(serial));
                }
                frame.state = FrameState::Extended;
                frame.roots += roots;
            }
            FrameOp::Drop | FrameOp::Return { .. } => {
                self.find(serial).ok_or(DisciplineError::NotActive(serial))?;
                if let Some(innermost) = self.innermost().filter(|&i| i != serial) {
                    return Err(DisciplineError::OutOfOrder {
                        ended: serial,
                        innermost,
                    });
                }

                self.active.pop();
            }
        }

        Ok(())
    }

    fn find(&self, serial: u64) -> Option<usize> {
        self.active.iter().rposition(|f| f.serial == serial)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_nesting() {
        let mut d = FrameDiscipline::new(0);

        let a = d.begin(2).unwrap();
        let b = d.begin(0).unwrap();
        assert_eq!((a.serial, a.depth), (0, 1));
        assert_eq!((b.serial, b.depth), (1, 2));
        assert_eq!(d.live_roots(), 2);

        d.extend(b.serial, 3).unwrap();
        assert_eq!(d.state(b.serial), Some(FrameState::Extended));
        assert_eq!(d.live_roots(), 5);

        let end_b = d.drop_frame(b.serial).unwrap();
        assert_eq!(end_b.depth, 2);
        let end_a = d.return_frame(a.serial, 1).unwrap();
        assert_eq!(end_a.op, FrameOp::Return { value: 1 });
        assert_eq!(d.depth(), 0);
        assert_eq!(d.live_roots(), 0);
    }

    #[test]
    fn test_out_of_order_end() {
        let mut d = FrameDiscipline::new(0);
        let a = d.begin(1).unwrap().serial;
        let b = d.begin(1).unwrap().serial;

        assert_eq!(
            d.drop_frame(a),
            Err(DisciplineError::OutOfOrder {
                ended: a,
                innermost: b
            })
        );

        // The failed end left everything alone
        assert_eq!(d.depth(), 2);
        d.drop_frame(b).unwrap();
        d.drop_frame(a).unwrap();
    }

    #[test]
    fn test_double_end() {
        let mut d = FrameDiscipline::new(0);
        let a = d.begin(0).unwrap().serial;
        d.drop_frame(a).unwrap();

        assert_eq!(d.drop_frame(a), Err(DisciplineError::NotActive(a)));
        assert_eq!(d.return_frame(a, 1), Err(DisciplineError::NotActive(a)));
        assert_eq!(d.extend(a, 1), Err(DisciplineError::NotActive(a)));
        assert_eq!(d.drop_frame(99), Err(DisciplineError::NotActive(99)));
    }

    #[test]
    fn test_single_extension() {
        let mut d = FrameDiscipline::new(0);
        let a = d.begin(1).unwrap().serial;

        d.local(a, 2).unwrap();
        assert_eq!(d.extend(a, 1), Err(DisciplineError::AlreadyExtended(a)));
        assert_eq!(d.local(a, 1), Err(DisciplineError::AlreadyExtended(a)));
        assert_eq!(d.state(a), Some(FrameState::Extended));
    }

    #[test]
    fn test_extend_outer_frame() {
        let mut d = FrameDiscipline::new(0);
        let a = d.begin(1).unwrap().serial;
        let b = d.begin(1).unwrap().serial;

        assert_eq!(
            d.extend(a, 1),
            Err(DisciplineError::NotInnermost {
                extended: a,
                innermost: b
            })
        );
        assert_eq!(d.state(a), Some(FrameState::Active));
    }

    #[test]
    fn test_root_counts() {
        let mut d = FrameDiscipline::new(0);

        assert_eq!(
            d.begin(6),
            Err(DisciplineError::BadRootCount {
                op: FrameOpKind::Begin,
                roots: 6
            })
        );

        let a = d.begin(5).unwrap().serial;
        assert_eq!(
            d.extend(a, 0),
            Err(DisciplineError::BadRootCount {
                op: FrameOpKind::Extend,
                roots: 0
            })
        );
        assert!(d.local(a, 6).is_err());
        d.extend(a, 5).unwrap();
    }

    #[test]
    fn test_sequential_frames_are_independent() {
        let mut d = FrameDiscipline::new(3);
        let a = d.begin(2).unwrap();
        d.drop_frame(a.serial).unwrap();
        let b = d.begin(1).unwrap();

        assert_ne!(a.serial, b.serial);
        assert_eq!(b.depth, 1);
        assert_eq!(b.thread, 3);
        assert_eq!(d.live_roots(), 1);
    }

    #[test]
    fn test_replay_rejects_duplicate_begin() {
        let mut d = FrameDiscipline::new(0);
        let begin = FrameEvent {
            thread: 0,
            serial: 4,
            depth: 1,
            op: FrameOp::Begin { roots: 0 },
        };

        d.apply(&begin).unwrap();
        assert_eq!(d.apply(&begin), Err(DisciplineError::AlreadyActive(4)));

        // Serials handed out afterwards don't collide with replayed ones
        assert_eq!(d.begin(0).unwrap().serial, 5);
    }

    #[test]
    fn test_replay_of_the_largest_serial() {
        let mut d = FrameDiscipline::new(0);
        let begin = FrameEvent {
            thread: 0,
            serial: u64::MAX,
            depth: 1,
            op: FrameOp::Begin { roots: 1 },
        };

        d.apply(&begin).unwrap();
        assert_eq!(d.depth(), 1);
        assert_eq!(d.drop_frame(u64::MAX).unwrap().serial, u64::MAX);
        assert_eq!(d.depth(), 0);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DisciplineError::OutOfOrder {
                ended: 1,
                innermost: 2
            }
            .to_string(),
            "Frame #1 ended while frame #2 is still active inside it"
        );
        assert_eq!(
            DisciplineError::BadRootCount {
                op: FrameOpKind::Extend,
                roots: 0
            }
            .to_string(),
            "0 roots is not a valid count for Extend"
        );
    }
}
