//! Packet framing dan wraparound-aware copy
//!
//! Format satu paket di storage:
//! `[len: u32 LE][payload: len bytes]`
//!
//! Posisi yang dipakai di sini selalu unbounded `u64`. Offset fisik didapat
//! dengan `pos & mask`, sehingga satu range logis bisa terpecah menjadi dua
//! copy ketika melewati ujung storage.

/// Ukuran length prefix setiap paket
pub const FRAME_HEADER_LEN: usize = std::mem::size_of::<u32>();

/// Membulatkan kapasitas ke power of 2 berikutnya (minimum 2).
///
/// Jika pembulatan ke atas overflow, dipakai power of 2 terbesar
/// yang masih bisa direpresentasikan.
pub fn round_capacity(requested: usize) -> usize {
    requested
        .max(2)
        .checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
}

/// Panjang total frame (header + payload), atau `None` jika tidak
/// pernah muat di ring dengan kapasitas `capacity`.
#[inline(always)]
pub(crate) fn frame_len(payload_len: usize, capacity: usize) -> Option<usize> {
    if payload_len > u32::MAX as usize {
        return None;
    }
    payload_len
        .checked_add(FRAME_HEADER_LEN)
        .filter(|&len| len <= capacity)
}

/// Cek `value` ada di range inklusif `[left, right]`.
///
/// Memakai jarak wrapping, jadi tetap benar setelah counter melewati
/// `u64::MAX`.
#[inline(always)]
pub(crate) fn is_in_range(left: u64, value: u64, right: u64) -> bool {
    value.wrapping_sub(left) <= right.wrapping_sub(left)
}

/// Frame dengan header di `pos` dan payload `payload_len` berakhir di atau sebelum `write_pos`
#[inline(always)]
pub(crate) fn frame_within(pos: u64, payload_len: usize, write_pos: u64) -> bool {
    let written = write_pos.wrapping_sub(pos);
    (payload_len as u64)
        .checked_add(FRAME_HEADER_LEN as u64)
        .map_or(false, |frame| frame <= written)
}

#[inline(always)]
fn split(storage_len: usize, pos: u64, len: usize) -> (usize, usize) {
    let offset = (pos & (storage_len as u64 - 1)) as usize;
    let first_part = (storage_len - offset).min(len);
    (offset, first_part)
}

/// Copy `src` ke storage mulai dari posisi logis `pos`
#[inline(always)]
pub(crate) fn copy_in(storage: &mut [u8], pos: u64, src: &[u8]) {
    let (offset, first_part) = split(storage.len(), pos, src.len());
    storage[offset..offset + first_part].copy_from_slice(&src[..first_part]);

    // Handle wraparound
    let second_part = src.len() - first_part;
    storage[..second_part].copy_from_slice(&src[first_part..]);
}

/// Copy dari storage mulai posisi logis `pos` ke `dst`
#[inline(always)]
pub(crate) fn copy_out(storage: &[u8], pos: u64, dst: &mut [u8]) {
    let (offset, first_part) = split(storage.len(), pos, dst.len());
    dst[..first_part].copy_from_slice(&storage[offset..offset + first_part]);

    let second_part = dst.len() - first_part;
    dst[first_part..].copy_from_slice(&storage[..second_part]);
}

/// Seperti [`copy_out`], tapi isi `dst` diganti dengan `len` bytes.
/// Kapasitas `dst` yang sudah ada dipakai ulang.
#[inline(always)]
pub(crate) fn copy_out_to_vec(storage: &[u8], pos: u64, len: usize, dst: &mut Vec<u8>) {
    let (offset, first_part) = split(storage.len(), pos, len);
    dst.clear();
    dst.extend_from_slice(&storage[offset..offset + first_part]);
    dst.extend_from_slice(&storage[..len - first_part]);
}

#[inline(always)]
pub(crate) fn write_header(storage: &mut [u8], pos: u64, payload_len: u32) {
    copy_in(storage, pos, &payload_len.to_le_bytes());
}

#[inline(always)]
pub(crate) fn read_header(storage: &[u8], pos: u64) -> u32 {
    let mut raw = [0u8; FRAME_HEADER_LEN];
    copy_out(storage, pos, &mut raw);
    u32::from_le_bytes(raw)
}
