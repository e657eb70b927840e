//! Routing table
//!
//! Longest prefix match over a binary radix trie. IPv4 routes are keyed on
//! the full 32-bit address; IPv6 routes only on the top 64 bits.

use super::DeviceId;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Route entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEntry<A> {
    /// Directly connected network on a device
    Connected(DeviceId),
    /// Reached through a gateway
    ViaNextHop(A),
}

/// Unsigned key type the trie walks MSB first.
pub trait PrefixBits: Copy + fmt::Debug {
    const BITS: u32;

    /// Bit `index` counted from the most significant end.
    fn bit(self, index: u32) -> bool;
}

impl PrefixBits for u32 {
    const BITS: u32 = 32;

    fn bit(self, index: u32) -> bool {
        (self >> (Self::BITS - 1 - index)) & 1 == 1
    }
}

impl PrefixBits for u64 {
    const BITS: u32 = 64;

    fn bit(self, index: u32) -> bool {
        (self >> (Self::BITS - 1 - index)) & 1 == 1
    }
}

#[derive(Debug)]
struct TrieNode<V> {
    depth: u32,
    children: [Option<Box<TrieNode<V>>>; 2],
    value: Option<V>,
}

impl<V> TrieNode<V> {
    fn new(depth: u32) -> Self {
        Self {
            depth,
            children: [None, None],
            value: None,
        }
    }
}

/// Binary radix trie with longest prefix match
#[derive(Debug)]
pub struct RadixTrie<K, V> {
    root: TrieNode<V>,
    len: usize,
    _key: std::marker::PhantomData<K>,
}

impl<K: PrefixBits, V> Default for RadixTrie<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PrefixBits, V> RadixTrie<K, V> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(0),
            len: 0,
            _key: std::marker::PhantomData,
        }
    }

    /// Store `value` for `prefix/prefix_len`, replacing any previous value
    /// for the same prefix. Lengths beyond the key width are clamped.
    pub fn insert(&mut self, prefix: K, prefix_len: u8, value: V) -> Option<V> {
        let prefix_len = (prefix_len as u32).min(K::BITS);
        let mut current = &mut self.root;
        for index in 0..prefix_len {
            let branch = prefix.bit(index) as usize;
            current = current.children[branch]
                .get_or_insert_with(|| Box::new(TrieNode::new(index + 1)))
                .as_mut();
        }
        let previous = current.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Most specific value whose prefix covers `key`.
    pub fn search(&self, key: K) -> Option<&V> {
        let mut current = &self.root;
        let mut best = current.value.as_ref();
        while current.depth < K::BITS {
            match &current.children[key.bit(current.depth) as usize] {
                Some(child) => current = &**child,
                None => break,
            }
            if let Some(value) = current.value.as_ref() {
                best = Some(value);
            }
        }
        best
    }

    /// Number of stored prefixes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// IPv4 routing table
#[derive(Debug, Default)]
pub struct Ipv4RoutingTable {
    trie: RadixTrie<u32, RouteEntry<Ipv4Addr>>,
}

impl Ipv4RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, destination: Ipv4Addr, prefix_len: u8, entry: RouteEntry<Ipv4Addr>) {
        self.trie.insert(u32::from(destination), prefix_len, entry);
    }

    pub fn lookup(&self, addr: Ipv4Addr) -> Option<RouteEntry<Ipv4Addr>> {
        self.trie.search(u32::from(addr)).copied()
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}

/// IPv6 routing table, indexed on the top 64 address bits
#[derive(Debug, Default)]
pub struct Ipv6RoutingTable {
    trie: RadixTrie<u64, RouteEntry<Ipv6Addr>>,
}

impl Ipv6RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix lengths above 64 are treated as /64.
    pub fn add(&mut self, destination: Ipv6Addr, prefix_len: u8, entry: RouteEntry<Ipv6Addr>) {
        let key = crate::protocol::ipv6::routing_prefix(destination);
        self.trie.insert(key, prefix_len, entry);
    }

    pub fn lookup(&self, addr: Ipv6Addr) -> Option<RouteEntry<Ipv6Addr>> {
        self.trie
            .search(crate::protocol::ipv6::routing_prefix(addr))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}
