// luaj-core - Values, objects, and bytecode for the LuaJ scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! State-owned object allocation.
//!
//! There is no garbage collector: the heap keeps every object it allocates
//! alive and frees them all when it is dropped. Allocation hands back
//! NaN-boxed pointer values, so a `Value` must never outlive the heap that
//! produced it.

use std::alloc::{alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;

use crate::object::{Header, ObjType, Proto, Str};
use crate::value::Value;

/// Owner of every live heap object.
#[derive(Default)]
pub struct Heap {
    objs: Vec<NonNull<Header>>,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Heap {
        Heap { objs: Vec::new() }
    }

    /// Allocate an immutable string with the given contents.
    pub fn alloc_str(&mut self, bytes: &[u8]) -> Value {
        let layout = Str::layout(bytes.len());
        let ptr = unsafe { alloc(layout) } as *mut Str;
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        Str::init(ptr, bytes);
        let header = ptr as *mut Header;
        self.objs.push(unsafe { NonNull::new_unchecked(header) });
        Value::from_obj(header)
    }

    /// Move a finished prototype onto the heap.
    pub fn alloc_proto(&mut self, proto: Proto) -> Value {
        let ptr = Box::into_raw(Box::new(proto));
        let header = ptr as *mut Header;
        self.objs.push(unsafe { NonNull::new_unchecked(header) });
        Value::from_obj(header)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for obj in self.objs.drain(..) {
            unsafe {
                match obj.as_ref().obj_type() {
                    ObjType::Str => {
                        let s = obj.as_ptr() as *mut Str;
                        let layout = Str::layout((*s).len());
                        dealloc(s as *mut u8, layout);
                    }
                    ObjType::Fn => {
                        drop(Box::from_raw(obj.as_ptr() as *mut Proto));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_str_round_trip() {
        let mut heap = Heap::new();
        let v = heap.alloc_str(b"hello");
        assert!(v.is_str());
        let s = unsafe { v.as_str_obj() };
        assert_eq!(s.len(), 5);
        assert_eq!(s.as_bytes(), b"hello");
    }

    #[test]
    fn alloc_empty_str() {
        let mut heap = Heap::new();
        let v = heap.alloc_str(b"");
        let s = unsafe { v.as_str_obj() };
        assert!(s.is_empty());
    }

    #[test]
    fn alloc_proto_keeps_type_tag() {
        let mut heap = Heap::new();
        let v = heap.alloc_proto(Proto::new(None, "chunk".into(), 1));
        assert!(v.is_fn());
        let f = unsafe { v.as_proto() };
        assert_eq!(&*f.chunk_name, "chunk");
    }

    #[test]
    fn heap_owns_many_objects() {
        let mut heap = Heap::new();
        for i in 0..100 {
            heap.alloc_str(format!("s{}", i).as_bytes());
        }
        assert_eq!(heap.len(), 100);
    }
}
