use crate::core::{Document, ElementNode, Point};
use crate::ops::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ancestor<'a> {
    pub path: &'a [usize],
    pub element: &'a ElementNode,
}

impl Ancestor<'_> {
    pub fn to_path(&self) -> Path {
        self.path.to_vec()
    }
}

pub fn find_ancestor<'a>(
    doc: &'a Document,
    kind: &str,
    position: Option<&'a Point>,
) -> Option<Ancestor<'a>> {
    let path = position?.path.as_slice();

    (1..=path.len()).rev().find_map(|len| {
        let candidate = &path[..len];
        doc.element(candidate)
            .filter(|el| el.kind == kind)
            .map(|element| Ancestor {
                path: candidate,
                element,
            })
    })
}
