/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Sanitizes a metadata full name into a label: every run of
/// non-alphanumeric characters collapses to a single underscore.
/// Idempotent, and its image is always a valid bare assembler identifier.
pub fn safe_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out
}

/// Stable 16-bit identity for a method, derived from its sanitized full
/// name. DefaultHasher uses fixed keys, so the value is reproducible
/// across runs and processes.
pub fn method_hash(sanitized_name: &str) -> u16 {
    let mut hasher = DefaultHasher::new();
    sanitized_name.hash(&mut hasher);
    hasher.finish() as u16
}

/// Branch-target label at a bytecode offset inside a method.
pub fn branch_label(method_hash: u16, offset: u32) -> String {
    format!("LB_{:04X}{:04X}", method_hash, offset & 0xFFFF)
}

/// Labels for an inline string blob and its continuation point. The blob
/// label hashes the encoded bytes, the continuation label hashes the
/// source string, so the pair is content-derived and deterministic.
pub fn blob_labels(bytes: &[u8], text: &str) -> (String, String) {
    let mut blob_hasher = DefaultHasher::new();
    bytes.hash(&mut blob_hasher);

    let mut cont_hasher = DefaultHasher::new();
    text.hash(&mut cont_hasher);
    // distinguish the pair even for pathological hash agreement
    1u8.hash(&mut cont_hasher);

    (
        format!("LB_{:08X}", blob_hasher.finish() as u32),
        format!("LB_{:08X}", cont_hasher.finish() as u32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name_replaces_runs() {
        assert_eq!(safe_name("TestOS.Program::Main"), "TestOS_Program_Main");
        assert_eq!(safe_name("ns.Class.Main"), "ns_Class_Main");
        assert_eq!(safe_name("a$$b"), "a_b");
    }

    #[test]
    fn test_safe_name_is_idempotent() {
        for name in ["TestOS.Program::Main", "a$$b", "x", ".cctor", "a__b"] {
            let once = safe_name(name);
            assert_eq!(safe_name(&once), once);
        }
    }

    #[test]
    fn test_safe_name_image_is_alphanumeric_or_underscore() {
        for name in ["Sys!em.Très::Ødd", "a b\tc", "::::"] {
            let sanitized = safe_name(name);
            assert!(
                sanitized
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "bad character in {:?}",
                sanitized
            );
        }
    }

    #[test]
    fn test_branch_labels_are_stable_and_distinct() {
        let hash = method_hash("ns_Class_Main");
        assert_eq!(hash, method_hash("ns_Class_Main"));
        assert_eq!(branch_label(hash, 4), branch_label(hash, 4));
        assert_ne!(branch_label(hash, 4), branch_label(hash, 5));
        assert_ne!(hash, method_hash("ns_Class_Other"));
    }

    #[test]
    fn test_blob_labels_differ_for_same_string() {
        let bytes = [0x48, 0x00, 0x49, 0x00];
        let (blob, cont) = blob_labels(&bytes, "Hi");
        assert_ne!(blob, cont);
        // deterministic across calls
        assert_eq!(blob_labels(&bytes, "Hi"), (blob, cont));
    }
}
