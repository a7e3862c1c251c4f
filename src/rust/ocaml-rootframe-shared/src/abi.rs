// Description of the C entrypoints exported by the staticlib.
//
// The staticlib generates its functions from the same arities listed here, and the tools use this
// to write the header, so a generator only ever has to look in one place.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Most slots a single begin/extend/local call can register (the size of `tables` in
/// `struct caml__roots_block`)
pub const MAX_ROOTS: usize = 5;

pub const HANDLE_TYPE: &str = "rootframe_t";
pub const CHECKED_HANDLE_TYPE: &str = "rootframe_checked_t";

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Family {
    Unchecked,
    Checked,
}

impl Family {
    pub fn prefix(&self) -> &'static str {
        match self {
            Family::Unchecked => "rootframe_",
            Family::Checked => "rootframe_checked_",
        }
    }

    pub fn handle_type(&self) -> &'static str {
        match self {
            Family::Unchecked => HANDLE_TYPE,
            Family::Checked => CHECKED_HANDLE_TYPE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EntryKind {
    Param,
    XParam,
    Local,
    Drop,
    Return,
}

impl EntryKind {
    fn stem(&self) -> &'static str {
        match self {
            EntryKind::Param => "param",
            EntryKind::XParam => "xparam",
            EntryKind::Local => "local",
            EntryKind::Drop => "drop",
            EntryKind::Return => "return",
        }
    }

    pub fn is_arity_variant(&self) -> bool {
        matches!(self, EntryKind::Param | EntryKind::XParam | EntryKind::Local)
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EntryPoint {
    pub family: Family,
    pub kind: EntryKind,
    pub arity: usize,
}

impl EntryPoint {
    pub fn symbol(&self) -> String {
        if self.kind.is_arity_variant() {
            format!("{}{}{}", self.family.prefix(), self.kind.stem(), self.arity)
        } else {
            format!("{}{}", self.family.prefix(), self.kind.stem())
        }
    }

    pub fn c_declaration(&self) -> String {
        let handle = self.family.handle_type();
        let slots = (0..self.arity).map(|i| format!("value *v{}", i));

        let (ret, params): (&str, Vec<String>) = match self.kind {
            EntryKind::Param => (handle, slots.collect()),
            EntryKind::XParam | EntryKind::Local => (
                "void",
                Some(format!("{} frame", handle))
                    .into_iter()
                    .chain(slots)
                    .collect(),
            ),
            EntryKind::Drop => ("void", vec![format!("{} frame", handle)]),
            EntryKind::Return => (
                "value",
                vec![format!("{} frame", handle), String::from("value result")],
            ),
        };

        let params = if params.is_empty() {
            String::from("void")
        } else {
            params.iter().join(", ")
        };

        format!("{} {}({});", ret, self.symbol(), params)
    }
}

/// Every entrypoint of a family, in the order they appear in the header
pub fn entrypoints(family: Family) -> Vec<EntryPoint> {
    let arity_range = |kind: EntryKind, from: usize| {
        (from..=MAX_ROOTS).map(move |arity| EntryPoint {
            family,
            kind,
            arity,
        })
    };

    arity_range(EntryKind::Param, 0)
        .chain(arity_range(EntryKind::XParam, 1))
        .chain(arity_range(EntryKind::Local, 1))
        .chain(
            [EntryKind::Drop, EntryKind::Return]
                .iter()
                .map(move |&kind| EntryPoint {
                    family,
                    kind,
                    arity: 0,
                }),
        )
        .collect()
}

const HEADER_START: &str = "\
/* Generated by ocaml-rootframe-tools, do not edit. */
#ifndef OCAML_ROOTFRAME_H
#define OCAML_ROOTFRAME_H

#include <stddef.h>
#include <stdint.h>
#include <caml/mlvalues.h>
#include <caml/memory.h>

#ifdef __cplusplus
extern \"C\" {
#endif

typedef struct {
  struct caml__roots_block *local_roots;
  size_t pool_mark;
} rootframe_t;
";

const CHECKED_TYPEDEF: &str = "
typedef struct {
  rootframe_t frame;
  uint64_t thread;
  uint64_t serial;
} rootframe_checked_t;
";

const HEADER_END: &str = "
#ifdef __cplusplus
}
#endif

#endif /* OCAML_ROOTFRAME_H */
";

pub fn render_header(families: &[Family]) -> String {
    let mut header = String::from(HEADER_START);

    if families.contains(&Family::Checked) {
        header.push_str(CHECKED_TYPEDEF);
    }

    header.push_str("\nvoid rootframe_on_startup(void);\nvoid rootframe_at_shutdown(void);\n");

    for family in families {
        header.push('\n');
        header.push_str(
            &entrypoints(*family)
                .iter()
                .map(EntryPoint::c_declaration)
                .join("\n"),
        );
        header.push('\n');
    }

    header.push_str(HEADER_END);
    header
}
