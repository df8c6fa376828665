//! Nucleotide helpers

/// Complement a single base, honoring IUPAC ambiguity codes and case
///
/// Characters without a complement (gaps, digits, ...) pass through.
pub fn complement_base(base: char) -> char {
    match base {
        'A' => 'T',
        'T' => 'A',
        'U' => 'A',
        'C' => 'G',
        'G' => 'C',
        'R' => 'Y',
        'Y' => 'R',
        'K' => 'M',
        'M' => 'K',
        'B' => 'V',
        'V' => 'B',
        'D' => 'H',
        'H' => 'D',
        'a' => 't',
        't' => 'a',
        'u' => 'a',
        'c' => 'g',
        'g' => 'c',
        'r' => 'y',
        'y' => 'r',
        'k' => 'm',
        'm' => 'k',
        'b' => 'v',
        'v' => 'b',
        'd' => 'h',
        'h' => 'd',
        // S, W, N and anything else are self-complementary or opaque
        other => other,
    }
}

/// Reverse complement a nucleotide string
pub fn reverse_complement(seq: &str) -> String {
    seq.chars().rev().map(complement_base).collect()
}

/// True for the four unambiguous bases, either case
pub fn is_acgt(base: char) -> bool {
    matches!(base, 'A' | 'C' | 'G' | 'T' | 'a' | 'c' | 'g' | 't')
}

/// Delete (not replace) every character that is not A/C/G/T
pub fn strip_non_acgt(seq: &str) -> String {
    seq.chars().filter(|&c| is_acgt(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("ACGT"), "ACGT");
        assert_eq!(reverse_complement("AAACCG"), "CGGTTT");
        assert_eq!(reverse_complement("acgN"), "Ncgt");
    }

    #[test]
    fn test_reverse_complement_iupac() {
        assert_eq!(reverse_complement("RYKM"), "KMRY");
        assert_eq!(reverse_complement("BDHV"), "BDHV");
        assert_eq!(reverse_complement("SW-"), "-WS");
    }

    #[test]
    fn test_strip_non_acgt() {
        assert_eq!(strip_non_acgt("ACNGT-RYacgt"), "ACGTacgt");
        assert_eq!(strip_non_acgt("NNN"), "");
    }
}
