use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;

use ocaml_rootframe_shared::FrameOpKind;

use crate::configuration::Options;
use crate::on_startup;

pub struct GlobalData {
    pub options: Options,
    pub op_counts: Option<HashMap<FrameOpKind, usize>>,
}

static GLOBAL_DATA: Lazy<Mutex<GlobalData>> = Lazy::new(|| Mutex::new(on_startup()));

// Consulted by every checked operation, so it's read once and kept outside the lock
static RECORDS_EVENTS: Lazy<bool> = Lazy::new(|| GlobalData::get().options.records_events());

impl GlobalData {
    pub fn new() -> GlobalData {
        GlobalData::with_options(Options::get_from_env())
    }

    pub fn with_options(options: Options) -> GlobalData {
        let op_counts = if options.save_op_counts {
            Some(HashMap::new())
        } else {
            None
        };

        GlobalData { options, op_counts }
    }

    // C stubs on any thread can get here. A panic while holding the lock has already gone
    // through the fatal error hook, so the data behind a poisoned lock is still usable.
    pub fn get() -> MutexGuard<'static, GlobalData> {
        GLOBAL_DATA.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether checked operations have anything to trace or count
    pub fn records_events() -> bool {
        *RECORDS_EVENTS
    }

    pub fn force() {
        Lazy::force(&GLOBAL_DATA);
    }
}

impl Default for GlobalData {
    fn default() -> Self {
        GlobalData::new()
    }
}
