use miette::{miette, Report, Severity};

use crate::symbol::Label;

// Assembly-time errors. The execution engine itself has no failure modes:
// every 16-bit address is in bounds and arithmetic wraps by definition.

pub fn duplicate_label(label: &Label, previous: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "each label may be defined once; rename one of the definitions",
        "Label `{label}` is already defined at address {previous:#06x}",
    )
}

pub fn reserved_label(label: &Label) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::reserved_label",
        help = "names starting with `__` are used for generated branch targets",
        "Label `{label}` uses a reserved name",
    )
}

pub fn undefined_label(label: &Label, sites: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undefined_label",
        help = "define the label with `define_label` before assembling",
        "Label `{label}` is referenced {sites} time(s) but never defined",
    )
}

pub fn image_too_large(len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::image_too_large",
        help = "programs must fit in the 65536-byte address space",
        "Emitted image is {len} bytes, larger than machine memory",
    )
}
