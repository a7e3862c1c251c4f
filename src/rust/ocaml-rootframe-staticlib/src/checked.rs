// The checked variant of the frame functions, for debugging generated code.
//
// Every call is validated against this thread's frame stack before anything touches the runtime,
// so a bad call leaves the roots exactly as they were. Only frames begun through here are known
// to the checker: mixing in unchecked frames on the same thread isn't detected.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use ocaml_rootframe_shared::{DisciplineError, FrameDiscipline, FrameEvent};

use crate::caml::domain_state::Host;
use crate::caml::mlvalues::Value;
use crate::frame::{self, CamlFrame};

static NEXT_THREAD: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static DISCIPLINE: RefCell<FrameDiscipline> =
        RefCell::new(FrameDiscipline::new(NEXT_THREAD.fetch_add(1, Ordering::Relaxed)));
}

fn with_discipline<R, F: FnOnce(&mut FrameDiscipline) -> R>(f: F) -> R {
    DISCIPLINE.with(|d| f(&mut d.borrow_mut()))
}

// Serials are only unique per thread, so a handle from elsewhere has to be turned away before its
// serial is looked up
fn with_frame_discipline<F>(frame: &CheckedFrame, f: F) -> Result<FrameEvent, DisciplineError>
where
    F: FnOnce(&mut FrameDiscipline) -> Result<FrameEvent, DisciplineError>,
{
    with_discipline(|d| {
        if d.thread() != frame.thread {
            return Err(DisciplineError::NotActive(frame.serial));
        }
        f(d)
    })
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CheckedFrame {
    frame: CamlFrame,
    thread: u64,
    serial: u64,
}

impl CheckedFrame {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn thread(&self) -> u64 {
        self.thread
    }

    pub fn frame(&self) -> CamlFrame {
        self.frame
    }
}

/// Number of checked frames active on this thread
pub fn depth() -> usize {
    with_discipline(|d| d.depth())
}

/// The id this thread's frames are traced under
pub fn thread_id() -> u64 {
    with_discipline(|d| d.thread())
}

/// # Safety
/// Every slot must stay valid until the frame ends
pub unsafe fn begin_frame<H: Host>(
    roots: &[*mut Value],
) -> Result<(CheckedFrame, FrameEvent), DisciplineError> {
    let event = with_discipline(|d| d.begin(roots.len()))?;
    let frame = frame::begin_frame::<H>(roots);

    Ok((
        CheckedFrame {
            frame,
            thread: event.thread,
            serial: event.serial,
        },
        event,
    ))
}

/// # Safety
/// Every slot must stay valid until the frame ends
pub unsafe fn extend_frame<H: Host>(
    frame: CheckedFrame,
    roots: &[*mut Value],
) -> Result<FrameEvent, DisciplineError> {
    let event = with_frame_discipline(&frame, |d| d.extend(frame.serial, roots.len()))?;
    frame::extend_frame::<H>(frame.frame, roots);
    Ok(event)
}

/// # Safety
/// Every slot must stay valid until the frame ends
pub unsafe fn local_frame<H: Host>(
    frame: CheckedFrame,
    slots: &[*mut Value],
) -> Result<FrameEvent, DisciplineError> {
    let event = with_frame_discipline(&frame, |d| d.local(frame.serial, slots.len()))?;
    frame::local_frame::<H>(frame.frame, slots);
    Ok(event)
}

pub fn drop_frame<H: Host>(frame: CheckedFrame) -> Result<FrameEvent, DisciplineError> {
    let event = with_frame_discipline(&frame, |d| d.drop_frame(frame.serial))?;
    // The checker has just confirmed it's the innermost active frame
    unsafe { frame::drop_frame::<H>(frame.frame) };
    Ok(event)
}

pub fn return_frame<H: Host>(
    frame: CheckedFrame,
    result: Value,
) -> Result<(Value, FrameEvent), DisciplineError> {
    let event =
        with_frame_discipline(&frame, |d| d.return_frame(frame.serial, result.raw() as u64))?;
    let result = unsafe { frame::return_frame::<H>(frame.frame, result) };
    Ok((result, event))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{self, SimHost};
    use expect_test::expect;
    use ocaml_rootframe_shared::FrameOp;

    #[test]
    fn test_events() {
        let mut a = Value::int(1);
        let mut b = Value::int(2);

        unsafe {
            let (outer, begin) = begin_frame::<SimHost>(&[&mut a as *mut Value]).unwrap();
            assert_eq!(begin.op, FrameOp::Begin { roots: 1 });
            assert_eq!(begin.depth, 1);
            assert_eq!(begin.thread, thread_id());

            let (inner, _) = begin_frame::<SimHost>(&[]).unwrap();
            let local = local_frame::<SimHost>(inner, &[&mut b as *mut Value]).unwrap();
            assert_eq!(local.op, FrameOp::Local { roots: 1 });
            assert_eq!(local.depth, 2);
            assert_eq!(b, Value::UNIT);
            assert_eq!(sim::registered_local_roots(), 2);

            let end = drop_frame::<SimHost>(inner).unwrap();
            assert_eq!(end.serial, inner.serial());

            let (result, end) = return_frame::<SimHost>(outer, a).unwrap();
            assert_eq!(result, Value::int(1));
            assert_eq!(end.op, FrameOp::Return { value: 3 });
        }

        assert_eq!(depth(), 0);
        assert_eq!(sim::registered_local_roots(), 0);
    }

    #[test]
    fn test_event_trace() {
        let mut a = Value::int(1);
        let mut b = Value::int(2);
        let mut c = Value::int(3);
        let mut events = Vec::new();

        unsafe {
            let (outer, event) = begin_frame::<SimHost>(&[&mut a as *mut Value]).unwrap();
            events.push(event);
            let (inner, event) = begin_frame::<SimHost>(&[]).unwrap();
            events.push(event);
            events.push(
                local_frame::<SimHost>(inner, &[&mut b as *mut Value, &mut c as *mut Value])
                    .unwrap(),
            );
            events.push(drop_frame::<SimHost>(inner).unwrap());
            events.push(return_frame::<SimHost>(outer, Value::int(5)).unwrap().1);
        }

        // Thread ids depend on which tests ran first
        let trace: Vec<String> = events
            .iter()
            .map(|e| e.to_string())
            .filter_map(|line| line.split_once("] ").map(|(_, rest)| rest.to_owned()))
            .collect();

        expect![[r#"
            begin 1 #0
              begin 0 #1
              local 2 #1
              drop #1
            return 0x000000000000000B #0"#]]
        .assert_eq(&trace.join("\n"));
    }

    #[test]
    fn test_out_of_order_is_rejected_without_touching_roots() {
        let mut a = Value::int(1);
        let mut b = Value::int(2);

        unsafe {
            let (outer, _) = begin_frame::<SimHost>(&[&mut a as *mut Value]).unwrap();
            let (inner, _) = begin_frame::<SimHost>(&[&mut b as *mut Value]).unwrap();
            let head = SimHost::local_roots();

            assert_eq!(
                drop_frame::<SimHost>(outer),
                Err(DisciplineError::OutOfOrder {
                    ended: outer.serial(),
                    innermost: inner.serial()
                })
            );
            assert_eq!(SimHost::local_roots(), head);
            assert_eq!(sim::registered_local_roots(), 2);

            drop_frame::<SimHost>(inner).unwrap();
            drop_frame::<SimHost>(outer).unwrap();
        }
    }

    #[test]
    fn test_double_extension_and_double_end() {
        let mut a = Value::int(1);
        let mut b = Value::int(2);

        unsafe {
            let (frame, _) = begin_frame::<SimHost>(&[]).unwrap();
            extend_frame::<SimHost>(frame, &[&mut a as *mut Value]).unwrap();
            assert_eq!(
                extend_frame::<SimHost>(frame, &[&mut b as *mut Value]),
                Err(DisciplineError::AlreadyExtended(frame.serial()))
            );
            assert_eq!(sim::registered_local_roots(), 1);

            drop_frame::<SimHost>(frame).unwrap();
            assert_eq!(
                drop_frame::<SimHost>(frame),
                Err(DisciplineError::NotActive(frame.serial()))
            );
            assert!(return_frame::<SimHost>(frame, a).is_err());
        }
    }

    // Only for moving a handle to another thread on purpose
    struct SentFrame(CheckedFrame);
    unsafe impl Send for SentFrame {}

    impl SentFrame {
        fn into_inner(self) -> CheckedFrame {
            self.0
        }
    }

    #[test]
    fn test_frames_from_other_threads_are_rejected() {
        let mut a = Value::int(1);
        let mut b = Value::int(2);

        unsafe {
            let (outer, _) = begin_frame::<SimHost>(&[&mut a as *mut Value]).unwrap();
            let (inner, _) = begin_frame::<SimHost>(&[&mut b as *mut Value]).unwrap();
            let sent = SentFrame(inner);

            // The other thread's innermost frame has the same serial as the one sent to it
            std::thread::spawn(move || {
                let foreign = sent.into_inner();
                let mut c = Value::int(3);
                let (own_outer, _) = begin_frame::<SimHost>(&[]).unwrap();
                let (own_inner, _) = begin_frame::<SimHost>(&[&mut c as *mut Value]).unwrap();
                assert_eq!(own_inner.serial(), foreign.serial());
                assert_ne!(own_inner.thread(), foreign.thread());

                let head = SimHost::local_roots();
                let mut d = Value::int(4);
                assert_eq!(
                    drop_frame::<SimHost>(foreign),
                    Err(DisciplineError::NotActive(foreign.serial()))
                );
                assert!(return_frame::<SimHost>(foreign, Value::UNIT).is_err());
                assert!(extend_frame::<SimHost>(foreign, &[&mut d as *mut Value]).is_err());
                assert_eq!(SimHost::local_roots(), head);
                assert_eq!(sim::registered_local_roots(), 1);

                drop_frame::<SimHost>(own_inner).unwrap();
                drop_frame::<SimHost>(own_outer).unwrap();
            })
            .join()
            .unwrap();

            assert_eq!(sim::registered_local_roots(), 2);
            drop_frame::<SimHost>(inner).unwrap();
            drop_frame::<SimHost>(outer).unwrap();
        }
    }
}
