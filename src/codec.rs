//! C1: Hashing & Object Codec.
//!
//! Pure byte-level (re)serialization of git commit and tree objects. These
//! functions know nothing about forges, retries, or the commit graph — they
//! just turn structured values into the exact bytes git would have hashed,
//! or the reverse.

use crate::errors::RecoveryError;
use crate::hash::ObjectId;

/// `"<mode> <name>\0" || raw20(sha)` for each entry, concatenated in order.
pub fn encode_tree(entries: &[(u32, &str, ObjectId)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (mode, name, sha) in entries {
        out.extend(mode.to_string().as_bytes());
        out.push(b' ');
        out.extend(name.as_bytes());
        out.push(0);
        out.extend(sha.as_bytes());
    }
    out
}

/// ```text
/// tree <tree-sha>\n
/// (parent <p>\n) for each parent in given order
/// author <authorStr>\n
/// committer <committerStr>\n
/// \n
/// <message>
/// ```
pub fn encode_commit_unsigned(
    tree: ObjectId,
    parents: &[ObjectId],
    author_str: &str,
    committer_str: &str,
    message: &str,
) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("tree ");
    out.push_str(&tree.to_string());
    out.push('\n');
    for parent in parents {
        out.push_str("parent ");
        out.push_str(&parent.to_string());
        out.push('\n');
    }
    out.push_str("author ");
    out.push_str(author_str);
    out.push('\n');
    out.push_str("committer ");
    out.push_str(committer_str);
    out.push('\n');
    out.push('\n');
    out.push_str(message);
    out.into_bytes()
}

/// Reconstructs a signed commit from the forge-provided `payload` by
/// inserting, immediately after the line starting with `committer `, a
/// `gpgsig` block built from `signature_block`'s lines, each prefixed with a
/// single space and newline-terminated, with the final trailing newline
/// removed. Only the *first* `committer`-prefixed line is augmented — a
/// commit message can itself contain a line starting with "committer" (most
/// often inside conflict markers), and that must not be touched.
pub fn encode_commit_signed(payload: &str, signature_block: &str) -> Vec<u8> {
    let mut out = String::new();
    let mut signature_added = false;

    for line in payload.split('\n') {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);

        if !signature_added && line.starts_with("committer") {
            signature_added = true;
            out.push_str("\ngpgsig");
            for sig_line in signature_block.split('\n') {
                out.push(' ');
                out.push_str(sig_line);
                out.push('\n');
            }
            // drop the trailing newline just appended, the next payload line
            // (or end of payload) supplies its own separator
            out.pop();
        }
    }

    out.into_bytes()
}

/// Replaces every `^X` caret-escape (`X` in `A..Z` or `[\]^_`) with the C0
/// control byte it stands for (`\x01..\x1F`). GitHub renders unprintable
/// control characters in commit messages this way; undoing it is required to
/// reproduce the exact original bytes (§4.8, scenario S3).
pub fn unescape_caret_controls(message: &str) -> String {
    let mut out = message.to_string();
    for (idx, ch) in ('A'..='Z').chain("[\\]^_".chars()).enumerate() {
        let to_replace = format!("^{ch}");
        if out.contains(&to_replace) {
            let control = char::from_u32((idx + 1) as u32).unwrap();
            out = out.replace(&to_replace, &control.to_string());
        }
    }
    out
}

/// Verifies that `computeId(kind, payload) == expected`, returning a
/// descriptive [`RecoveryError::InvalidSha`] otherwise.
pub fn verify_id(
    kind: crate::internal::object::types::ObjectKind,
    payload: &[u8],
    expected: ObjectId,
    context: impl Into<String>,
) -> Result<(), RecoveryError> {
    let computed = ObjectId::compute(kind, payload);
    if computed == expected {
        Ok(())
    } else {
        Err(RecoveryError::InvalidSha {
            expected: expected.to_string(),
            computed: computed.to_string(),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_escape_roundtrips_to_control_byte() {
        let unescaped = unescape_caret_controls("fix ^B bug");
        assert_eq!(unescaped, "fix \u{2} bug");
    }

    #[test]
    fn caret_escape_only_replaces_known_letters() {
        let unescaped = unescape_caret_controls("a^Zb^[c");
        assert!(unescaped.contains('\u{1a}'));
        assert!(unescaped.contains('\u{1b}'));
    }

    #[test]
    fn signed_commit_inserts_gpgsig_after_first_committer_line() {
        let payload = "tree abc\nauthor A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nmessage mentions committer too\n";
        let sig = "-----BEGIN PGP SIGNATURE-----\n\nabc\n=xyz\n-----END PGP SIGNATURE-----";
        let out = String::from_utf8(encode_commit_signed(payload, sig)).unwrap();
        assert!(out.contains("committer A <a@b> 1 +0000\ngpgsig -----BEGIN PGP SIGNATURE-----"));
        // the message's own "committer" substring is untouched
        assert_eq!(out.matches("gpgsig").count(), 1);
        assert!(out.ends_with("message mentions committer too\n"));
    }
}
