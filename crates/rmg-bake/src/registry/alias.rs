use crate::{AliasError, Res, ResKind};

///Union-find forest over the ids of one resource kind.
///
/// Roots are always the declared base of a chain. Linking never re-roots a tree, which keeps "base" meaningful.
/// After [flatten](Self::flatten) every node points at its root directly, so [base](Self::base) is a single lookup.
pub(crate) struct AliasForest {
    kind: ResKind,
    ///`None` for unregistered ids, the node itself for roots.
    parent: Vec<Option<u32>>,
    ///Position of each node within its chain in declaration order. Roots are always 0.
    order: Vec<u32>,
    next_order: u32,
}

impl AliasForest {
    pub fn new(kind: ResKind, capacity: usize) -> Self {
        AliasForest {
            kind,
            parent: vec![None; capacity],
            order: vec![0; capacity],
            next_order: 1,
        }
    }

    fn res(&self, id: u32) -> Res {
        Res::new(self.kind, id)
    }

    pub fn register(&mut self, id: u32) {
        self.parent[id as usize] = Some(id);
    }

    pub fn is_registered(&self, id: u32) -> bool {
        self.parent.get(id as usize).map(|p| p.is_some()).unwrap_or(false)
    }

    fn is_root(&self, id: u32) -> bool {
        self.parent[id as usize] == Some(id)
    }

    ///Finds the root of `id`, compressing the path on the way. `id` must be registered.
    pub fn find(&mut self, id: u32) -> u32 {
        let mut root = id;
        while let Some(parent) = self.parent[root as usize] {
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut current = id;
        while current != root {
            let next = self.parent[current as usize].unwrap_or(root);
            self.parent[current as usize] = Some(root);
            current = next;
        }

        root
    }

    ///Declares `alias` as an alias of `base`. `alias` must not be aliased yet.
    pub fn link(&mut self, base: u32, alias: u32) -> Result<u32, AliasError> {
        if !self.is_registered(alias) {
            return Err(AliasError::UnknownAlias {
                alias: self.res(alias),
            });
        }
        if !self.is_registered(base) {
            return Err(AliasError::UnknownBase {
                alias: self.res(alias),
                base: self.res(base),
            });
        }
        if !self.is_root(alias) {
            let current = self.find(alias);
            return Err(AliasError::AlreadyAliased {
                alias: self.res(alias),
                base: self.res(current),
            });
        }

        let root = self.find(base);
        if root == alias {
            return Err(AliasError::Cycle {
                alias: self.res(alias),
                base: self.res(base),
            });
        }

        self.parent[alias as usize] = Some(root);
        self.order[alias as usize] = self.next_order;
        self.next_order += 1;

        Ok(root)
    }

    ///Points every registered node at its root.
    pub fn flatten(&mut self) {
        for id in 0..self.parent.len() as u32 {
            if self.is_registered(id) {
                self.find(id);
            }
        }
    }

    ///Root of `id`. Only valid after [flatten](Self::flatten).
    pub fn base(&self, id: u32) -> u32 {
        self.parent
            .get(id as usize)
            .copied()
            .flatten()
            .unwrap_or(id)
    }

    pub fn order(&self, id: u32) -> u32 {
        self.order.get(id as usize).copied().unwrap_or(0)
    }
}
