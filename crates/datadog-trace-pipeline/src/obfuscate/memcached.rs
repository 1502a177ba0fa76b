// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Keeps only the command line of a memcached command.
///
/// Every memcached command ends with a new line, and storage commands carry
/// the stored value after it.
pub fn obfuscate_memcached_string(cmd: &str) -> String {
    cmd.split("\r\n").next().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;

    use super::obfuscate_memcached_string;

    #[duplicate_item(
        test_name           input                                               expected_output;
        [test_set]          ["set mykey 0 60 5\r\nvalue"]                       ["set mykey 0 60 5"];
        [test_get]          ["get mykey"]                                       ["get mykey"];
        [test_add]          ["add newkey 0 60 5\r\nvalue\r\n"]                  ["add newkey 0 60 5"];
        [test_trim]         ["  decr mykey 5 \r\n"]                             ["decr mykey 5"];
        [test_empty]        [""]                                                [""];
    )]
    #[test]
    fn test_name() {
        assert_eq!(obfuscate_memcached_string(input), expected_output);
    }
}
