// viaseal – implementation of the DKIM and ARC specifications
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Common parsing utilities.

const CRLF: &[u8] = b"\r\n";

// FWS = ([*WSP CRLF] 1*WSP)

/// Strips one occurrence of folding whitespace.
pub fn strip_fws(input: &[u8]) -> Option<&[u8]> {
    if let Some(s) = strip_wsp(input) {
        s.strip_prefix(CRLF).and_then(strip_wsp).or(Some(s))
    } else {
        input.strip_prefix(CRLF).and_then(strip_wsp)
    }
}

/// Trims folding whitespace on both sides. Stray CR and LF are trimmed, too,
/// as they occur in sloppily folded real-world header values.
pub fn trim_fws(input: &str) -> &str {
    input.trim_matches(is_fws_char)
}

/// Removes all whitespace from a value, as required for Base64 tag values.
pub fn remove_fws(input: &str) -> String {
    input.chars().filter(|&c| !is_fws_char(c)).collect()
}

fn strip_wsp(input: &[u8]) -> Option<&[u8]> {
    let n = input.iter().take_while(|&&b| is_wsp_byte(b)).count();
    (n > 0).then(|| &input[n..])
}

// RFC 5234, appendix B.1

pub fn is_wsp_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t')
}

fn is_fws_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}
