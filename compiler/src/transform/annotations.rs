//! Extraction of the module-level annotation table.

use indexmap::IndexMap;

use common::{log_debug, log_warn, names};

use crate::ir::{Constant, FuncId, Module};

/// One entry of the annotation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub text: String,
    /// The file operand as found in the table, passed as is to routines.
    pub file: Constant,
    /// The line operand as found in the table.
    pub line: Constant,
    pub file_name: String,
    pub line_no: i64,
}

pub type GlobalAnnotations = IndexMap<FuncId, Vec<AnnotationRecord>>;

/// Groups the entries of the annotation table by the function they
/// decorate, in table order, and removes the table from the module.
pub fn extract(module: &mut Module) -> GlobalAnnotations {
    let mut grouped = GlobalAnnotations::new();
    let Some(table_id) = module.global_by_name(names::GLOBAL_ANNOTATIONS) else {
        log_debug!("No annotation table in module `{}`", module.name);
        return grouped;
    };

    let Some(table) = module.remove_global(table_id) else {
        return grouped;
    };
    if table.section.as_deref() != Some(names::GLOBAL_ANNOTATIONS_SECTION) {
        log_warn!(
            "Annotation table is in section {:?} instead of `{}`",
            table.section,
            names::GLOBAL_ANNOTATIONS_SECTION
        );
    }

    let entries = match table.init {
        Some(Constant::Array { elems, .. }) => elems,
        Some(Constant::Zero(_)) | None => Vec::new(),
        Some(other) => {
            log_warn!("Unexpected annotation table initializer: {:?}", other);
            Vec::new()
        }
    };

    for entry in entries {
        let Constant::Struct { fields, .. } = entry else {
            log_debug!("Skipping non-struct annotation entry: {:?}", entry);
            continue;
        };
        let [owner, text, file, line, ..] = fields.as_slice() else {
            log_debug!("Skipping annotation entry with {} fields", fields.len());
            continue;
        };
        let Constant::Func(owner) = owner.strip_casts() else {
            log_debug!("Skipping annotation on a non-function: {:?}", owner);
            continue;
        };
        let Some(text) = module.c_string_of(text) else {
            log_debug!("Skipping annotation entry without a string: {:?}", text);
            continue;
        };

        let record = AnnotationRecord {
            file_name: module.c_string_of(file).unwrap_or_default(),
            line_no: line.as_int().unwrap_or_default(),
            text,
            file: file.clone(),
            line: line.clone(),
        };
        grouped.entry(*owner).or_default().push(record);
    }

    grouped
}
