use serde_json::Value;

use crate::core::{ApplyError, AttrPatch, Document, Editor};
use crate::ops::{Batch, Op, Path, Transaction};

// Writes that would not change the document are dropped.
pub struct Writer<'a> {
    doc: &'a Document,
    ops: Vec<Op>,
}

impl<'a> Writer<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            ops: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: Value, path: &[usize]) {
        let current = self.doc.element(path).and_then(|el| el.attr(name));
        if current == Some(&value) {
            return;
        }
        self.push_patch(path, AttrPatch::set(name, value));
    }

    pub fn remove_attribute(&mut self, name: &str, path: &[usize]) {
        let present = self
            .doc
            .element(path)
            .is_some_and(|el| el.attrs.contains_key(name));
        if !present {
            return;
        }
        self.push_patch(path, AttrPatch::remove(name));
    }

    fn push_patch(&mut self, path: &[usize], patch: AttrPatch) {
        self.ops.push(Op::SetNodeAttrs {
            path: Path::from(path),
            patch,
        });
    }

    fn into_ops(self) -> Vec<Op> {
        self.ops
    }
}

impl Editor {
    /// Applies what `f` wrote as one transaction. A scope that writes nothing leaves the
    /// history untouched.
    pub fn change<R>(
        &mut self,
        batch: Option<Batch>,
        source: &str,
        f: impl FnOnce(&mut Writer<'_>) -> R,
    ) -> Result<R, ApplyError> {
        let mut writer = Writer::new(self.doc());
        let out = f(&mut writer);
        let ops = writer.into_ops();

        if ops.is_empty() {
            return Ok(out);
        }

        self.apply(Transaction::new(ops).source(source).batch(batch))?;
        Ok(out)
    }
}
