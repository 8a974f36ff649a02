//! Handler 链的 Arena 表示。
//!
//! 节点以稳定下标存放在 `nodes` 中，`prev/next` 为下标而非指针；删除后的槽位进入空闲表复用。
//! 链头与链尾是固定在 0、1 号槽位的哨兵，永不删除。

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CoreError, Result, codes, config_error};

use super::{Capabilities, ChannelHandler};

pub(crate) type NodeId = usize;

pub(crate) const HEAD: NodeId = 0;
pub(crate) const TAIL: NodeId = 1;

pub(crate) const HEAD_NAME: &str = "head";
pub(crate) const TAIL_NAME: &str = "tail";

#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) name: Arc<str>,
    pub(crate) handler: Option<Arc<dyn ChannelHandler>>,
    pub(crate) capabilities: Capabilities,
    prev: NodeId,
    next: NodeId,
}

#[derive(Clone)]
pub(crate) struct Chain {
    nodes: Vec<Option<Node>>,
    index: HashMap<Arc<str>, NodeId>,
    vacant: Vec<NodeId>,
}

impl Chain {
    pub(crate) fn new() -> Self {
        // 链头只承担出站终点：把写入交给连接。
        let head = Node {
            name: Arc::from(HEAD_NAME),
            handler: None,
            capabilities: Capabilities::WRITE,
            prev: HEAD,
            next: TAIL,
        };
        let tail = Node {
            name: Arc::from(TAIL_NAME),
            handler: None,
            capabilities: Capabilities::NONE,
            prev: HEAD,
            next: TAIL,
        };
        Self {
            nodes: vec![Some(head), Some(tail)],
            index: HashMap::new(),
            vacant: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    pub(crate) fn handler(&self, id: NodeId) -> Option<&Arc<dyn ChannelHandler>> {
        self.node(id).and_then(|node| node.handler.as_ref())
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<NodeId> {
        self.index.get(name).copied().ok_or_else(|| {
            CoreError::new(
                codes::PIPELINE_UNKNOWN_CONTEXT,
                format!("no context named `{name}`"),
            )
        })
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn check_new_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(config_error("context name must not be empty"));
        }
        if name == HEAD_NAME || name == TAIL_NAME || self.index.contains_key(name) {
            return Err(CoreError::new(
                codes::PIPELINE_DUPLICATE_NAME,
                format!("context name `{name}` is already taken"),
            ));
        }
        Ok(())
    }

    pub(crate) fn prev_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).map(|node| node.prev)
    }

    pub(crate) fn next_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).map(|node| node.next)
    }

    /// 在 `prev` 与 `next` 之间插入新节点，调用方保证二者相邻。
    pub(crate) fn insert_between(
        &mut self,
        prev: NodeId,
        next: NodeId,
        name: &str,
        handler: Arc<dyn ChannelHandler>,
        capabilities: Capabilities,
    ) -> NodeId {
        let name: Arc<str> = Arc::from(name);
        let node = Node {
            name: Arc::clone(&name),
            handler: Some(handler),
            capabilities,
            prev,
            next,
        };
        let id = match self.vacant.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        if let Some(prev) = self.node_mut(prev) {
            prev.next = id;
        }
        if let Some(next) = self.node_mut(next) {
            next.prev = id;
        }
        self.index.insert(name, id);
        id
    }

    /// 摘除节点并把槽位放回空闲表。
    pub(crate) fn unlink(&mut self, id: NodeId) -> Option<Node> {
        if id == HEAD || id == TAIL {
            return None;
        }
        let node = self.nodes.get_mut(id)?.take()?;
        if let Some(prev) = self.node_mut(node.prev) {
            prev.next = node.next;
        }
        if let Some(next) = self.node_mut(node.next) {
            next.prev = node.prev;
        }
        self.index.remove(&node.name);
        self.vacant.push(id);
        Some(node)
    }

    /// 原地替换节点的名称与 Handler，位置不变。
    pub(crate) fn replace(
        &mut self,
        id: NodeId,
        name: &str,
        handler: Arc<dyn ChannelHandler>,
        capabilities: Capabilities,
    ) -> Option<Arc<dyn ChannelHandler>> {
        let name: Arc<str> = Arc::from(name);
        let node = self.node_mut(id)?;
        let old_name = std::mem::replace(&mut node.name, Arc::clone(&name));
        let old_handler = node.handler.replace(handler);
        node.capabilities = capabilities;
        self.index.remove(&old_name);
        self.index.insert(name, id);
        old_handler
    }

    /// 自 `from` 之后查找第一个声明 `capability` 的节点，不含链尾。
    pub(crate) fn next_with(&self, from: NodeId, capability: Capabilities) -> Option<NodeId> {
        let mut id = self.next_of(from)?;
        while id != TAIL {
            let node = self.node(id)?;
            if node.capabilities.contains(capability) {
                return Some(id);
            }
            id = node.next;
        }
        None
    }

    /// 自 `from` 之前查找第一个声明 `capability` 的节点，含链头。
    pub(crate) fn prev_with(&self, from: NodeId, capability: Capabilities) -> Option<NodeId> {
        if from == HEAD {
            return None;
        }
        let mut id = self.prev_of(from)?;
        loop {
            let node = self.node(id)?;
            if node.capabilities.contains(capability) {
                return Some(id);
            }
            if id == HEAD {
                return None;
            }
            id = node.prev;
        }
    }

    /// 按链上顺序列出用户节点名称。
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.index.len());
        let mut id = self.next_of(HEAD);
        while let Some(current) = id.filter(|current| *current != TAIL) {
            let Some(node) = self.node(current) else {
                break;
            };
            names.push(node.name.to_string());
            id = Some(node.next);
        }
        names
    }
}
