//! Fixed-size copy dispatch for the slot sizes the bucket layout is tuned
//! for, with a generic fallback for everything else.

#[inline]
pub fn copy(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    match src.len() {
        0 => {}
        4 => copy_n::<4>(dst, src),
        8 => copy_n::<8>(dst, src),
        16 => copy_n::<16>(dst, src),
        20 => copy_n::<20>(dst, src),
        32 => copy_n::<32>(dst, src),
        48 => copy_n::<48>(dst, src),
        64 => copy_n::<64>(dst, src),
        128 => copy_n::<128>(dst, src),
        256 => copy_n::<256>(dst, src),
        _ => dst.copy_from_slice(src),
    }
}

#[inline(always)]
fn copy_n<const N: usize>(dst: &mut [u8], src: &[u8]) {
    let d: &mut [u8; N] = dst.try_into().expect("dst length matches N");
    let s: &[u8; N] = src.try_into().expect("src length matches N");
    *d = *s;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_every_tuned_size() {
        for &n in &[0, 4, 8, 16, 20, 32, 48, 64, 128, 256] {
            let src = vec![0xAAu8; n];
            let mut dst = vec![0u8; n];
            copy(&mut dst, &src);
            assert_eq!(dst, src, "size {n}");
        }
    }

    #[test]
    fn falls_back_for_untuned_sizes() {
        let src = vec![7u8; 13];
        let mut dst = vec![0u8; 13];
        copy(&mut dst, &src);
        assert_eq!(dst, src);
    }
}
