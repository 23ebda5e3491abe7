// Licensed under the Apache-2.0 license

//! In-memory entity-association tree and its serialization into
//! PLDM_PDR_ENTITY_ASSOCIATION records.
//!
//! The tree is a strict arena: nodes are addressed by index, not raw
//! pointer, so deep copy and subtree deletion are plain `Vec` surgery
//! rather than manual graph traversal with cycle bookkeeping.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::error::PldmError;
use crate::pdr::{pdr_type, PdrRepo, PDR_HEADER_LEN};

pub const ENTITY_INSTANCE_WILDCARD: u16 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationType {
    Physical = 0,
    Logical = 1,
}

impl AssociationType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(AssociationType::Physical),
            1 => Some(AssociationType::Logical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entity {
    pub entity_type: u16,
    pub entity_instance_num: u16,
    pub entity_container_id: u16,
}

/// An opaque reference to a node in a specific [`EntityAssociationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef(usize);

struct Node {
    entity: Entity,
    parent: Option<usize>,
    is_remote: bool,
    container_id: Option<u16>,
    physical_children: Vec<usize>,
    logical_children: Vec<usize>,
}

/// An arena of entity nodes, possibly holding more than one root.
#[derive(Default)]
pub struct EntityAssociationTree {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    next_container_id: u16,
}

impl EntityAssociationTree {
    pub fn init() -> Self {
        EntityAssociationTree::default()
    }

    pub fn destroy(self) {}

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn children_of(&self, idx: usize, assoc: AssociationType) -> &[usize] {
        match assoc {
            AssociationType::Physical => &self.nodes[idx].physical_children,
            AssociationType::Logical => &self.nodes[idx].logical_children,
        }
    }

    fn used_instances(&self, parent_idx: usize, entity_type: u16) -> Vec<u16> {
        let node = &self.nodes[parent_idx];
        node.physical_children
            .iter()
            .chain(node.logical_children.iter())
            .filter_map(|&c| {
                let e = &self.nodes[c].entity;
                (e.entity_type == entity_type).then_some(e.entity_instance_num)
            })
            .collect()
    }

    fn resolve_instance(
        &self,
        parent_idx: Option<usize>,
        entity_type: u16,
        requested: u16,
    ) -> Result<u16, PldmError> {
        let Some(parent_idx) = parent_idx else {
            return Ok(if requested == ENTITY_INSTANCE_WILDCARD { 0 } else { requested });
        };
        let used = self.used_instances(parent_idx, entity_type);
        if requested == ENTITY_INSTANCE_WILDCARD {
            let mut candidate = 1u16;
            while used.contains(&candidate) {
                candidate += 1;
            }
            Ok(candidate)
        } else if used.contains(&requested) {
            Err(PldmError::AlreadyExists)
        } else {
            Ok(requested)
        }
    }

    /// Adds a local entity. `parent` is `None` for a root entity.
    pub fn add(
        &mut self,
        entity: &mut Entity,
        entity_instance_number: u16,
        parent: Option<NodeRef>,
        association_type: AssociationType,
    ) -> Result<NodeRef, PldmError> {
        self.add_entity(
            entity,
            entity_instance_number,
            parent,
            association_type,
            false,
            true,
            0,
        )
    }

    /// Adds an entity, optionally forcing `container_id` instead of
    /// deriving it from the parent (used when rebuilding a tree from a
    /// remote PDR that already carries container IDs).
    #[allow(clippy::too_many_arguments)]
    pub fn add_entity(
        &mut self,
        entity: &mut Entity,
        entity_instance_number: u16,
        parent: Option<NodeRef>,
        association_type: AssociationType,
        is_remote: bool,
        is_update_container_id: bool,
        container_id: u16,
    ) -> Result<NodeRef, PldmError> {
        let parent_idx = parent.map(|p| p.0);
        if let Some(idx) = parent_idx {
            if idx >= self.nodes.len() {
                return Err(PldmError::InvalidArgument);
            }
        }

        let instance = self.resolve_instance(parent_idx, entity.entity_type, entity_instance_number)?;

        let resolved_container_id = match parent_idx {
            None => 0,
            Some(idx) => {
                if is_update_container_id {
                    if let Some(id) = self.nodes[idx].container_id {
                        id
                    } else {
                        self.next_container_id += 1;
                        let id = self.next_container_id;
                        self.nodes[idx].container_id = Some(id);
                        id
                    }
                } else {
                    container_id
                }
            }
        };

        entity.entity_instance_num = instance;
        entity.entity_container_id = resolved_container_id;

        let new_idx = self.nodes.len();
        self.nodes.push(Node {
            entity: *entity,
            parent: parent_idx,
            is_remote,
            container_id: None,
            physical_children: Vec::new(),
            logical_children: Vec::new(),
        });

        match parent_idx {
            None => self.roots.push(new_idx),
            Some(idx) => match association_type {
                AssociationType::Physical => self.nodes[idx].physical_children.push(new_idx),
                AssociationType::Logical => self.nodes[idx].logical_children.push(new_idx),
            },
        }

        Ok(NodeRef(new_idx))
    }

    pub fn extract(&self, node: NodeRef) -> Entity {
        self.nodes[node.0].entity
    }

    pub fn get_remote_container_id(&self, node: NodeRef) -> u16 {
        self.nodes[node.0].entity.entity_container_id
    }

    pub fn is_node_parent(&self, node: NodeRef) -> bool {
        let n = &self.nodes[node.0];
        !n.physical_children.is_empty() || !n.logical_children.is_empty()
    }

    pub fn get_parent(&self, node: NodeRef) -> Option<Entity> {
        self.nodes[node.0].parent.map(|idx| self.nodes[idx].entity)
    }

    pub fn get_num_children(&self, node: NodeRef, association_type: AssociationType) -> u8 {
        self.children_of(node.0, association_type).len() as u8
    }

    pub fn is_current_parent_child(&self, parent: NodeRef, child: &Entity) -> bool {
        let n = &self.nodes[parent.0];
        n.physical_children
            .iter()
            .chain(n.logical_children.iter())
            .any(|&c| self.nodes[c].entity == *child)
    }

    /// Looks up an entity by `(entity_type, entity_instance_num)` and
    /// fills in its `entity_container_id`.
    pub fn find(&self, entity: &mut Entity) -> Option<NodeRef> {
        self.find_with_locality_inner(entity, None)
    }

    pub fn find_with_locality(&self, entity: &mut Entity, is_remote: bool) -> Option<NodeRef> {
        self.find_with_locality_inner(entity, Some(is_remote))
    }

    fn find_with_locality_inner(&self, entity: &mut Entity, is_remote: Option<bool>) -> Option<NodeRef> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let locality_matches = match is_remote {
                Some(want) => node.is_remote == want,
                None => true,
            };
            if node.entity.entity_type == entity.entity_type
                && node.entity.entity_instance_num == entity.entity_instance_num
                && locality_matches
            {
                entity.entity_container_id = node.entity.entity_container_id;
                return Some(NodeRef(idx));
            }
        }
        None
    }

    /// Depth-first visit: the root, then each parent's physical
    /// children before its logical children, recursively.
    pub fn visit(&self) -> Vec<Entity> {
        let mut out = Vec::new();
        for &root in &self.roots {
            self.visit_node(root, &mut out);
        }
        out
    }

    fn visit_node(&self, idx: usize, out: &mut Vec<Entity>) {
        out.push(self.nodes[idx].entity);
        for &child in &self.nodes[idx].physical_children {
            self.visit_node(child, out);
        }
        for &child in &self.nodes[idx].logical_children {
            self.visit_node(child, out);
        }
    }

    /// Deep-copies `self`'s roots (and their subtrees) into `dst`.
    pub fn copy_root(&self, dst: &mut EntityAssociationTree) {
        dst.nodes.clear();
        dst.roots.clear();
        dst.next_container_id = self.next_container_id;
        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        for (old_idx, node) in self.nodes.iter().enumerate() {
            let new_idx = dst.nodes.len();
            dst.nodes.push(Node {
                entity: node.entity,
                parent: node.parent.map(|p| *remap.get(&p).expect("parents precede children")),
                is_remote: node.is_remote,
                container_id: node.container_id,
                physical_children: Vec::new(),
                logical_children: Vec::new(),
            });
            remap.insert(old_idx, new_idx);
        }
        for (old_idx, node) in self.nodes.iter().enumerate() {
            let new_idx = remap[&old_idx];
            dst.nodes[new_idx].physical_children = node
                .physical_children
                .iter()
                .map(|c| remap[c])
                .collect();
            dst.nodes[new_idx].logical_children = node
                .logical_children
                .iter()
                .map(|c| remap[c])
                .collect();
        }
        dst.roots = self.roots.iter().map(|r| remap[r]).collect();
    }

    fn subtree_indices(&self, idx: usize, out: &mut Vec<usize>) {
        out.push(idx);
        for &c in &self.nodes[idx].physical_children {
            self.subtree_indices(c, out);
        }
        for &c in &self.nodes[idx].logical_children {
            self.subtree_indices(c, out);
        }
    }

    /// Removes a subtree rooted at the node matching `entity`.
    pub fn delete_node(&mut self, entity: &Entity) -> Result<(), PldmError> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.entity == *entity)
            .ok_or(PldmError::NotFound)?;

        let mut doomed = Vec::new();
        self.subtree_indices(idx, &mut doomed);
        let doomed_set: BTreeSet<usize> = doomed.into_iter().collect();

        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        let mut new_nodes = Vec::new();
        for (old_idx, node) in self.nodes.iter().enumerate() {
            if doomed_set.contains(&old_idx) {
                continue;
            }
            remap.insert(old_idx, new_nodes.len());
            new_nodes.push(Node {
                entity: node.entity,
                parent: node.parent,
                is_remote: node.is_remote,
                container_id: node.container_id,
                physical_children: Vec::new(),
                logical_children: Vec::new(),
            });
        }
        for (old_idx, node) in self.nodes.iter().enumerate() {
            if doomed_set.contains(&old_idx) {
                continue;
            }
            let new_idx = remap[&old_idx];
            new_nodes[new_idx].parent = node.parent.map(|p| remap[&p]);
            new_nodes[new_idx].physical_children = node
                .physical_children
                .iter()
                .filter(|c| !doomed_set.contains(c))
                .map(|c| remap[c])
                .collect();
            new_nodes[new_idx].logical_children = node
                .logical_children
                .iter()
                .filter(|c| !doomed_set.contains(c))
                .map(|c| remap[c])
                .collect();
        }
        self.roots = self
            .roots
            .iter()
            .filter(|r| !doomed_set.contains(r))
            .map(|r| remap[r])
            .collect();
        self.nodes = new_nodes;
        Ok(())
    }

    fn association_pdr_body(&self, parent_idx: usize, assoc: AssociationType) -> Vec<u8> {
        let parent = &self.nodes[parent_idx].entity;
        let children = self.children_of(parent_idx, assoc);
        let mut body = Vec::with_capacity(10 + 6 * children.len());
        body.extend_from_slice(&parent.entity_container_id.to_le_bytes());
        body.push(assoc as u8);
        body.extend_from_slice(&parent.entity_type.to_le_bytes());
        body.extend_from_slice(&parent.entity_instance_num.to_le_bytes());
        body.extend_from_slice(&parent.entity_container_id.to_le_bytes());
        body.push(children.len() as u8);
        for &c in children {
            let e = &self.nodes[c].entity;
            body.extend_from_slice(&e.entity_type.to_le_bytes());
            body.extend_from_slice(&e.entity_instance_num.to_le_bytes());
            body.extend_from_slice(&e.entity_container_id.to_le_bytes());
        }
        body
    }

    fn association_pdr_record(body: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(PDR_HEADER_LEN + body.len());
        data.extend_from_slice(&0u32.to_le_bytes()); // record_handle, patched by repo
        data.push(1); // version
        data.push(pdr_type::ENTITY_ASSOCIATION);
        data.extend_from_slice(&0u16.to_le_bytes()); // record_change_number
        data.extend_from_slice(&(body.len() as u16).to_le_bytes());
        data.extend_from_slice(body);
        data
    }

    /// Emits one association PDR per `(parent, assoc_type)` pair with a
    /// non-empty child list, in tree-traversal order, assigning record
    /// handles from the repository's normal policy.
    pub fn association_pdr_add(
        &self,
        repo: &mut PdrRepo,
        is_remote: bool,
        terminus_handle: u16,
    ) -> Result<(), PldmError> {
        for idx in 0..self.nodes.len() {
            for assoc in [AssociationType::Physical, AssociationType::Logical] {
                if self.children_of(idx, assoc).is_empty() {
                    continue;
                }
                let body = self.association_pdr_body(idx, assoc);
                let record = Self::association_pdr_record(&body);
                let mut handle = 0u32;
                repo.add(&record, is_remote, terminus_handle, &mut handle)?;
            }
        }
        Ok(())
    }

    /// Like [`Self::association_pdr_add`] but emits the PDR for a
    /// single node, under caller-supplied record handles.
    pub fn association_pdr_add_from_node_with_record_handle(
        &self,
        node: NodeRef,
        repo: &mut PdrRepo,
        is_remote: bool,
        terminus_handle: u16,
        record_handle: u32,
    ) -> Result<(), PldmError> {
        for assoc in [AssociationType::Physical, AssociationType::Logical] {
            if self.children_of(node.0, assoc).is_empty() {
                continue;
            }
            let body = self.association_pdr_body(node.0, assoc);
            let record = Self::association_pdr_record(&body);
            let mut handle = record_handle;
            repo.add(&record, is_remote, terminus_handle, &mut handle)?;
        }
        Ok(())
    }
}

fn patch_association_len(data: &mut [u8], body_len: usize) {
    data[8..10].copy_from_slice(&(body_len as u16).to_le_bytes());
}

/// Appends `entity` as a child to an existing association PDR.
pub fn association_pdr_add_contained_entity_to_remote_pdr(
    repo: &mut PdrRepo,
    entity: &Entity,
    pdr_record_handle: u32,
) -> Result<(), PldmError> {
    let data = repo.record_data_mut(pdr_record_handle)?;
    if data.len() < PDR_HEADER_LEN + 9 {
        return Err(PldmError::MalformedPdr);
    }
    let num_children_idx = PDR_HEADER_LEN + 9;
    let num_children = data[num_children_idx];
    data[num_children_idx] = num_children.checked_add(1).ok_or(PldmError::InvalidArgument)?;
    data.extend_from_slice(&entity.entity_type.to_le_bytes());
    data.extend_from_slice(&entity.entity_instance_num.to_le_bytes());
    data.extend_from_slice(&entity.entity_container_id.to_le_bytes());
    let body_len = data.len() - PDR_HEADER_LEN;
    patch_association_len(data, body_len);
    Ok(())
}

/// Reverses [`association_pdr_add_contained_entity_to_remote_pdr`]. If
/// removing the entity empties the association, the whole PDR is
/// deleted.
pub fn association_pdr_remove_contained_entity(
    repo: &mut PdrRepo,
    entity: &Entity,
    is_remote: bool,
    io_record_handle: u32,
) -> Result<(), PldmError> {
    let data = repo.record_data_mut(io_record_handle)?;
    if data.len() < PDR_HEADER_LEN + 10 {
        return Err(PldmError::MalformedPdr);
    }
    let num_children_idx = PDR_HEADER_LEN + 9;
    let num_children = data[num_children_idx] as usize;
    let children_start = num_children_idx + 1;
    let mut found = None;
    for i in 0..num_children {
        let off = children_start + i * 6;
        let child_type = u16::from_le_bytes([data[off], data[off + 1]]);
        let child_inst = u16::from_le_bytes([data[off + 2], data[off + 3]]);
        let child_cid = u16::from_le_bytes([data[off + 4], data[off + 5]]);
        if child_type == entity.entity_type
            && child_inst == entity.entity_instance_num
            && child_cid == entity.entity_container_id
        {
            found = Some(i);
            break;
        }
    }
    let Some(i) = found else {
        return Err(PldmError::NotFound);
    };
    let off = children_start + i * 6;
    data.drain(off..off + 6);
    data[num_children_idx] -= 1;
    if data[num_children_idx] == 0 {
        repo.delete_by_record_handle(io_record_handle, is_remote)?;
    } else {
        let body_len = data.len() - PDR_HEADER_LEN;
        patch_association_len(data, body_len);
    }
    Ok(())
}

/// Inserts a fresh association PDR containing exactly one
/// `(parent, child)` pair immediately after `after_handle`.
pub fn association_pdr_create_new(
    repo: &mut PdrRepo,
    after_handle: u32,
    parent: &Entity,
    child: &Entity,
    terminus_handle: u16,
    is_remote: bool,
) -> Result<u32, PldmError> {
    let mut body = Vec::with_capacity(16);
    body.extend_from_slice(&parent.entity_container_id.to_le_bytes());
    body.push(AssociationType::Physical as u8);
    body.extend_from_slice(&parent.entity_type.to_le_bytes());
    body.extend_from_slice(&parent.entity_instance_num.to_le_bytes());
    body.extend_from_slice(&parent.entity_container_id.to_le_bytes());
    body.push(1);
    body.extend_from_slice(&child.entity_type.to_le_bytes());
    body.extend_from_slice(&child.entity_instance_num.to_le_bytes());
    body.extend_from_slice(&child.entity_container_id.to_le_bytes());

    let mut data = Vec::with_capacity(PDR_HEADER_LEN + body.len());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.push(1);
    data.push(pdr_type::ENTITY_ASSOCIATION);
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&(body.len() as u16).to_le_bytes());
    data.extend_from_slice(&body);

    repo.insert_after(after_handle, data, terminus_handle, is_remote)
}

/// Inverse of PDR association serialization: parses a
/// PLDM_PDR_ENTITY_ASSOCIATION body into `[parent, child_0, child_1,
/// ...]`.
pub fn pdr_extract(pdr_body: &[u8]) -> Result<Vec<Entity>, PldmError> {
    use crate::msgbuf::MsgBuf;

    let mut mb = MsgBuf::new(pdr_body, 10).map_err(PldmError::from)?;
    let container_id = mb.extract_u16().map_err(PldmError::from)?;
    let _association_type = mb.extract_u8().map_err(PldmError::from)?;
    let parent_type = mb.extract_u16().map_err(PldmError::from)?;
    let parent_instance = mb.extract_u16().map_err(PldmError::from)?;
    let _parent_container_id = mb.extract_u16().map_err(PldmError::from)?;
    let num_children = mb.extract_u8().map_err(PldmError::from)?;

    let mut out = Vec::with_capacity(1 + num_children as usize);
    out.push(Entity {
        entity_type: parent_type,
        entity_instance_num: parent_instance,
        entity_container_id: container_id,
    });
    for _ in 0..num_children {
        let entity_type = mb.extract_u16().map_err(PldmError::from)?;
        let entity_instance_num = mb.extract_u16().map_err(PldmError::from)?;
        let entity_container_id = mb.extract_u16().map_err(PldmError::from)?;
        out.push(Entity {
            entity_type,
            entity_instance_num,
            entity_container_id,
        });
    }
    mb.complete().map_err(PldmError::from)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(entity_type: u16) -> Entity {
        Entity {
            entity_type,
            entity_instance_num: 0,
            entity_container_id: 0,
        }
    }

    #[test]
    fn container_ids_shared_by_siblings_instances_per_type() {
        let mut tree = EntityAssociationTree::init();
        let mut root_entity = leaf(1);
        let root = tree.add(&mut root_entity, ENTITY_INSTANCE_WILDCARD, None, AssociationType::Physical).unwrap();

        let mut c1 = leaf(2);
        let n1 = tree
            .add(&mut c1, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();
        let mut c2 = leaf(2);
        let n2 = tree
            .add(&mut c2, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();
        let mut c3 = leaf(3);
        let n3 = tree
            .add(&mut c3, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();

        assert_eq!(c1.entity_container_id, c2.entity_container_id);
        assert_eq!(c1.entity_container_id, c3.entity_container_id);
        assert_eq!(c1.entity_instance_num, 1);
        assert_eq!(c2.entity_instance_num, 2);
        assert_eq!(c3.entity_instance_num, 1);
        assert_ne!(tree.extract(n1).entity_container_id, 0);
        let _ = n2;
        let _ = n3;
    }

    #[test]
    fn explicit_instance_collision_rejected() {
        let mut tree = EntityAssociationTree::init();
        let mut root_entity = leaf(1);
        let root = tree.add(&mut root_entity, ENTITY_INSTANCE_WILDCARD, None, AssociationType::Physical).unwrap();
        let mut c1 = leaf(2);
        tree.add(&mut c1, 5, Some(root), AssociationType::Physical).unwrap();
        let mut c2 = leaf(2);
        assert_eq!(
            tree.add(&mut c2, 5, Some(root), AssociationType::Physical),
            Err(PldmError::AlreadyExists)
        );
    }

    #[test]
    fn association_pdr_add_emits_one_record_per_parent_assoc_pair() {
        let mut tree = EntityAssociationTree::init();
        let mut root_entity = leaf(1);
        let root = tree.add(&mut root_entity, ENTITY_INSTANCE_WILDCARD, None, AssociationType::Physical).unwrap();

        let mut logical_a = leaf(3);
        tree.add(&mut logical_a, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Logical)
            .unwrap();
        let mut logical_b = leaf(3);
        tree.add(&mut logical_b, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Logical)
            .unwrap();

        let mut phys_a = leaf(2);
        tree.add(&mut phys_a, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();
        let mut phys_b = leaf(2);
        tree.add(&mut phys_b, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();
        let mut phys_c = leaf(3);
        tree.add(&mut phys_c, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();

        let mut repo = PdrRepo::init();
        tree.association_pdr_add(&mut repo, false, 1).unwrap();
        assert_eq!(repo.get_record_count(), 2);

        let (record1, _) = repo.find_record(1).unwrap();
        let extracted1 = pdr_extract(&record1.data()[PDR_HEADER_LEN..]).unwrap();
        assert_eq!(extracted1.len(), 3); // parent + 2 logical children

        let (record2, _) = repo.find_record(2).unwrap();
        let extracted2 = pdr_extract(&record2.data()[PDR_HEADER_LEN..]).unwrap();
        assert_eq!(extracted2.len(), 4); // parent + 3 physical children
        assert_eq!(extracted2[1].entity_type, 2);
        assert_eq!(extracted2[2].entity_type, 2);
        assert_eq!(extracted2[3].entity_type, 3);
        assert_eq!(extracted2[1].entity_instance_num, 1);
        assert_eq!(extracted2[2].entity_instance_num, 2);
        assert_eq!(extracted2[3].entity_instance_num, 1);
    }

    #[test]
    fn multi_level_tree_container_ids_and_pdr_count() {
        // Mirrors libpldm's own EntityAssociationPDR.testBuild fixture:
        //         1
        //         |
        //         2--3--4
        //         |
        //         5--6--7
        //         |  |
        //         9  8
        let mut tree = EntityAssociationTree::init();
        let mut e1 = leaf(1);
        let l1 = tree.add(&mut e1, ENTITY_INSTANCE_WILDCARD, None, AssociationType::Physical).unwrap();
        let mut e2 = leaf(2);
        let l2a = tree.add(&mut e2, ENTITY_INSTANCE_WILDCARD, Some(l1), AssociationType::Physical).unwrap();
        let mut e3 = leaf(2);
        tree.add(&mut e3, ENTITY_INSTANCE_WILDCARD, Some(l1), AssociationType::Physical).unwrap();
        let mut e4 = leaf(3);
        tree.add(&mut e4, ENTITY_INSTANCE_WILDCARD, Some(l1), AssociationType::Physical).unwrap();
        let mut e5 = leaf(4);
        let l3a = tree.add(&mut e5, ENTITY_INSTANCE_WILDCARD, Some(l2a), AssociationType::Physical).unwrap();
        let mut e6 = leaf(5);
        let l3b = tree.add(&mut e6, ENTITY_INSTANCE_WILDCARD, Some(l2a), AssociationType::Physical).unwrap();
        let mut e7 = leaf(5);
        tree.add(&mut e7, ENTITY_INSTANCE_WILDCARD, Some(l2a), AssociationType::Physical).unwrap();
        let mut e8 = leaf(6);
        tree.add(&mut e8, ENTITY_INSTANCE_WILDCARD, Some(l3a), AssociationType::Physical).unwrap();
        let mut e9 = leaf(7);
        tree.add(&mut e9, ENTITY_INSTANCE_WILDCARD, Some(l3b), AssociationType::Physical).unwrap();

        // siblings under l1 (e2, e3, e4) share a container id; same for
        // the three children of l2a, and the single children of l3a/l3b.
        assert_eq!(e2.entity_container_id, e3.entity_container_id);
        assert_eq!(e2.entity_container_id, e4.entity_container_id);
        assert_eq!(e5.entity_container_id, e6.entity_container_id);
        assert_eq!(e5.entity_container_id, e7.entity_container_id);
        assert_ne!(e2.entity_container_id, e5.entity_container_id);
        assert_ne!(e8.entity_container_id, e9.entity_container_id);

        // per-(parent, type) instance numbering: two type-2 siblings
        // under l1 get instances 1 and 2; two type-5 siblings under
        // l2a likewise.
        assert_eq!(e2.entity_instance_num, 1);
        assert_eq!(e3.entity_instance_num, 2);
        assert_eq!(e6.entity_instance_num, 1);
        assert_eq!(e7.entity_instance_num, 2);

        assert_eq!(tree.visit().len(), 9);

        let mut repo = PdrRepo::init();
        tree.association_pdr_add(&mut repo, false, 1).unwrap();
        // one PDR per parent that has children: l1, l2a, l3a, l3b.
        assert_eq!(repo.get_record_count(), 4);
    }

    #[test]
    fn delete_node_removes_subtree() {
        let mut tree = EntityAssociationTree::init();
        let mut root_entity = leaf(1);
        let root = tree.add(&mut root_entity, ENTITY_INSTANCE_WILDCARD, None, AssociationType::Physical).unwrap();
        let mut c1 = leaf(2);
        tree.add(&mut c1, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();
        assert_eq!(tree.visit().len(), 2);
        tree.delete_node(&c1).unwrap();
        assert_eq!(tree.visit().len(), 1);
    }

    #[test]
    fn copy_root_produces_independent_tree() {
        let mut tree = EntityAssociationTree::init();
        let mut root_entity = leaf(1);
        let root = tree.add(&mut root_entity, ENTITY_INSTANCE_WILDCARD, None, AssociationType::Physical).unwrap();
        let mut c1 = leaf(2);
        tree.add(&mut c1, ENTITY_INSTANCE_WILDCARD, Some(root), AssociationType::Physical)
            .unwrap();

        let mut copy = EntityAssociationTree::init();
        tree.copy_root(&mut copy);
        assert_eq!(copy.visit(), tree.visit());

        let mut c2 = leaf(3);
        let copy_root = NodeRef(0);
        copy.add(&mut c2, ENTITY_INSTANCE_WILDCARD, Some(copy_root), AssociationType::Physical)
            .unwrap();
        assert_eq!(tree.visit().len(), 2);
        assert_eq!(copy.visit().len(), 3);
    }
}
