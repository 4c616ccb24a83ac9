// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Classify remote faults into POSIX error codes.
// Author: Lukas Bower

//! Classification of remote faults into POSIX error codes.

use crate::adapter::Errno;
use crate::port::RemoteFault;

/// Fault classes recognized by the driver, ordered subclass before
/// superclass. Matching is linear and the first hit wins; keep that order
/// when adding entries.
const FAULT_TABLE: &[(&str, Errno)] = &[
    ("java/lang/IllegalArgumentException", Errno::INVAL),
    ("java/lang/IndexOutOfBoundsException", Errno::INVAL),
    ("java/io/FileNotFoundException", Errno::NOENT),
];

/// Error code assigned to faults with no table entry.
const DEFAULT_ERRNO: Errno = Errno::IO;

/// Map a remote fault to its POSIX error code.
///
/// Each table entry is checked against the fault's class and its reported
/// ancestry, so a subclass the driver has never heard of still lands on its
/// nearest known ancestor.
#[must_use]
pub fn classify(fault: &RemoteFault) -> Errno {
    for (class, errno) in FAULT_TABLE {
        if fault.is_instance_of(class) {
            return *errno;
        }
    }
    DEFAULT_ERRNO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_classes_map_per_table() {
        let cases = [
            ("java/lang/IllegalArgumentException", Errno::INVAL),
            ("java/lang/IndexOutOfBoundsException", Errno::INVAL),
            ("java/io/FileNotFoundException", Errno::NOENT),
        ];
        for (class, errno) in cases {
            assert_eq!(classify(&RemoteFault::new(class, "")), errno, "{class}");
        }
    }

    #[test]
    fn subclasses_match_through_ancestry() {
        let fault = RemoteFault::new("java/lang/ArrayIndexOutOfBoundsException", "index 9")
            .with_ancestry(vec![
                "java/lang/IndexOutOfBoundsException".to_owned(),
                "java/lang/RuntimeException".to_owned(),
            ]);
        assert_eq!(classify(&fault), Errno::INVAL);
    }

    #[test]
    fn unknown_classes_default_to_eio() {
        let fault = RemoteFault::new("rmi/RMIException", "connection refused");
        assert_eq!(classify(&fault), Errno::IO);
    }
}
