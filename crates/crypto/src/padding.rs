//! Block padding schemes used by the settings file formats.

/// Padding applied before block-mode encryption.
///
/// `unpad` verifies the padding and reports failure without touching the
/// buffer, because for some formats the padding is genuinely optional and
/// an intact buffer is needed for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// No padding.
    #[default]
    None,
    /// Zero-fill up to the block size.
    Zero,
    /// PKCS#7: n bytes of value n.
    Pkcs7,
    /// ANSI X9.23: n-1 zeros, then a byte holding n.
    AnsiX923,
    /// Like ANSI X9.23, but the last byte holds n-1.
    AnsiIsh,
    /// One full block of zeros.
    ZeroBlock,
    /// One full block of 0x01 bytes.
    OneBlock,
}

fn align_left(num: usize, alignment: usize) -> usize {
    num - (num % alignment)
}

impl Padding {
    /// Append padding to `buf` for the given cipher block size.
    pub fn pad(self, buf: &mut Vec<u8>, blocksize: usize) {
        match self {
            Padding::None => {}
            Padding::ZeroBlock => buf.extend(std::iter::repeat(0u8).take(blocksize)),
            Padding::OneBlock => buf.extend(std::iter::repeat(1u8).take(blocksize)),
            _ => {
                let padnum = blocksize - (buf.len() % blocksize);
                match self {
                    Padding::Pkcs7 => {
                        buf.extend(std::iter::repeat(padnum as u8).take(padnum));
                    }
                    Padding::AnsiX923 => {
                        buf.extend(std::iter::repeat(0u8).take(padnum - 1));
                        buf.push(padnum as u8);
                    }
                    Padding::AnsiIsh => {
                        buf.extend(std::iter::repeat(0u8).take(padnum - 1));
                        buf.push((padnum - 1) as u8);
                    }
                    Padding::Zero => buf.extend(std::iter::repeat(0u8).take(padnum)),
                    _ => unreachable!(),
                }
            }
        }
    }

    /// Verify and strip padding from `buf`.
    ///
    /// `extra` is the number of framing bytes (checksum, prefix) that sat in
    /// front of `buf` within the padded region. Returns whether padding was
    /// removed; on failure `buf` is left untouched.
    pub fn unpad(self, buf: &mut Vec<u8>, blocksize: usize, extra: usize) -> bool {
        match self {
            Padding::Pkcs7 | Padding::AnsiX923 | Padding::AnsiIsh => {
                let Some(&last) = buf.last() else {
                    return false;
                };

                let padnum = usize::from(last) + usize::from(self == Padding::AnsiIsh);
                if padnum == 0 || padnum > buf.len() {
                    return false;
                }

                let expected = blocksize - ((buf.len() + extra - padnum) % blocksize);
                if padnum == expected {
                    buf.truncate(buf.len() - padnum);
                    true
                } else {
                    false
                }
            }
            Padding::Zero => {
                let tail = align_left(buf.len(), blocksize);
                if buf[tail..].iter().all(|&b| b == 0) {
                    buf.truncate(tail);
                    true
                } else {
                    false
                }
            }
            Padding::ZeroBlock | Padding::OneBlock => {
                let ch = if self == Padding::ZeroBlock { 0u8 } else { 1u8 };
                if buf.len() >= blocksize && buf[buf.len() - blocksize..].iter().all(|&b| b == ch)
                {
                    buf.truncate(buf.len() - blocksize);
                    true
                } else {
                    false
                }
            }
            Padding::None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkcs7_round_trip() {
        let mut buf = vec![0xaa; 13];
        Padding::Pkcs7.pad(&mut buf, 16);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[13..], &[3, 3, 3]);

        assert!(Padding::Pkcs7.unpad(&mut buf, 16, 0));
        assert_eq!(buf.len(), 13);
    }

    #[test]
    fn test_ansi_x923() {
        let mut buf = vec![0xaa; 12];
        Padding::AnsiX923.pad(&mut buf, 8);
        assert_eq!(&buf[12..], &[0, 0, 0, 4]);

        assert!(Padding::AnsiX923.unpad(&mut buf, 8, 16));
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_ansi_ish_stores_padnum_minus_one() {
        let mut buf = vec![0xaa; 12];
        Padding::AnsiIsh.pad(&mut buf, 8);
        assert_eq!(&buf[12..], &[0, 0, 0, 3]);

        assert!(Padding::AnsiIsh.unpad(&mut buf, 8, 16));
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_zero_block() {
        let mut buf = vec![0xaa; 16];
        Padding::ZeroBlock.pad(&mut buf, 16);
        assert_eq!(buf.len(), 32);

        assert!(Padding::ZeroBlock.unpad(&mut buf, 16, 0));
        assert_eq!(buf.len(), 16);

        // a non-zero final block must be left alone
        let mut buf = vec![0xaa; 32];
        assert!(!Padding::ZeroBlock.unpad(&mut buf, 16, 0));
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn test_bad_pkcs7_leaves_buffer_untouched() {
        // 15 bytes ending in 0x03: removing 3 bytes would leave 12, which is
        // not congruent with the block size
        let mut buf = vec![0xaa; 14];
        buf.push(0x03);
        let before = buf.clone();

        assert!(!Padding::Pkcs7.unpad(&mut buf, 16, 0));
        assert_eq!(buf, before);
    }
}
