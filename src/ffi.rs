//! C ABI untuk pemanggil non-Rust
//!
//! Setiap objek (channel, publisher, subscriber) diwakili handle `u64`
//! opaque. Handle adalah key ke registry proses dengan tag jenis di 8 bit
//! teratas; id tidak pernah dipakai ulang. Handle yang sudah di-destroy,
//! tidak pernah dibuat, atau salah jenis selalu gagal dengan aman
//! (`false` / `0`) alih-alih membaca memori yang sudah dibebaskan.
//!
//! Header C: `include/varcast.h`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{const_mutex, Mutex};
use tracing::warn;

use crate::channel::{Channel, Publisher, Subscriber};
use crate::error::{ChannelError, HandleKind, Result};

/// Handle opaque; `0` tidak pernah valid
pub type VarcastHandle = u64;

const KIND_SHIFT: u32 = 56;
const ID_MASK: u64 = (1 << KIND_SHIFT) - 1;

enum Entry {
    Channel(Channel),
    Publisher(Publisher),
    // Mutex per subscriber: blocking read tidak boleh menahan lock registry
    Subscriber(Arc<Mutex<Subscriber>>),
}

impl Entry {
    fn kind(&self) -> HandleKind {
        match self {
            Entry::Channel(_) => HandleKind::Channel,
            Entry::Publisher(_) => HandleKind::Publisher,
            Entry::Subscriber(_) => HandleKind::Subscriber,
        }
    }
}

fn kind_tag(kind: HandleKind) -> u64 {
    match kind {
        HandleKind::Channel => 1,
        HandleKind::Publisher => 2,
        HandleKind::Subscriber => 3,
    }
}

struct Registry {
    entries: BTreeMap<VarcastHandle, Entry>,
    next_id: u64,
}

impl Registry {
    const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn insert(&mut self, entry: Entry) -> VarcastHandle {
        let id = self.next_id & ID_MASK;
        self.next_id += 1;
        let handle = (kind_tag(entry.kind()) << KIND_SHIFT) | id;
        self.entries.insert(handle, entry);
        handle
    }

    fn remove(&mut self, kind: HandleKind, handle: VarcastHandle) -> Result<Entry> {
        if self.entries.get(&handle).map(Entry::kind) != Some(kind) {
            return Err(ChannelError::InvalidHandle { kind, handle });
        }
        self.entries
            .remove(&handle)
            .ok_or(ChannelError::InvalidHandle { kind, handle })
    }
}

static REGISTRY: Mutex<Registry> = const_mutex(Registry::new());

fn lookup_channel(handle: VarcastHandle) -> Result<Channel> {
    match REGISTRY.lock().entries.get(&handle) {
        Some(Entry::Channel(channel)) => Ok(channel.clone()),
        _ => Err(ChannelError::InvalidHandle {
            kind: HandleKind::Channel,
            handle,
        }),
    }
}

fn lookup_publisher(handle: VarcastHandle) -> Result<Publisher> {
    match REGISTRY.lock().entries.get(&handle) {
        Some(Entry::Publisher(publisher)) => Ok(publisher.clone()),
        _ => Err(ChannelError::InvalidHandle {
            kind: HandleKind::Publisher,
            handle,
        }),
    }
}

fn lookup_subscriber(handle: VarcastHandle) -> Result<Arc<Mutex<Subscriber>>> {
    match REGISTRY.lock().entries.get(&handle) {
        Some(Entry::Subscriber(subscriber)) => Ok(Arc::clone(subscriber)),
        _ => Err(ChannelError::InvalidHandle {
            kind: HandleKind::Subscriber,
            handle,
        }),
    }
}

/// Hapus handle dari registry dan nol-kan handle milik pemanggil
unsafe fn destroy(kind: HandleKind, handle_ptr: *mut VarcastHandle) {
    if handle_ptr.is_null() {
        return;
    }

    let handle = *handle_ptr;
    if let Err(err) = REGISTRY.lock().remove(kind, handle) {
        warn!(%err, "destroy called with invalid handle");
    }
    *handle_ptr = 0;
}

/// Membuat channel baru. Kapasitas dibulatkan ke power of 2.
///
/// Returns `0` jika storage tidak bisa dialokasikan
#[no_mangle]
pub extern "C" fn varcast_channel_create(capacity: libc::size_t) -> VarcastHandle {
    match Channel::try_new(capacity) {
        Ok(channel) => REGISTRY.lock().insert(Entry::Channel(channel)),
        Err(err) => {
            warn!(%err, "cannot create channel");
            0
        }
    }
}

/// Destroy channel. Publisher dan subscriber yang sudah dibuat tetap valid.
///
/// # Safety
/// `channel` harus null atau pointer valid ke sebuah handle.
#[no_mangle]
pub unsafe extern "C" fn varcast_channel_destroy(channel: *mut VarcastHandle) {
    destroy(HandleKind::Channel, channel)
}

/// Returns `0` jika `channel` tidak valid
#[no_mangle]
pub extern "C" fn varcast_publisher_create(channel: VarcastHandle) -> VarcastHandle {
    match lookup_channel(channel) {
        Ok(channel) => REGISTRY
            .lock()
            .insert(Entry::Publisher(channel.publisher())),
        Err(err) => {
            warn!(%err, "cannot create publisher");
            0
        }
    }
}

/// # Safety
/// `publisher` harus null atau pointer valid ke sebuah handle.
#[no_mangle]
pub unsafe extern "C" fn varcast_publisher_destroy(publisher: *mut VarcastHandle) {
    destroy(HandleKind::Publisher, publisher)
}

/// Publish satu paket. Data lama akan ditimpa jika ring penuh.
///
/// # Safety
/// `data` harus null atau menunjuk ke `length` bytes yang bisa dibaca.
#[no_mangle]
pub unsafe extern "C" fn varcast_publish(
    publisher: VarcastHandle,
    data: *const libc::c_void,
    length: libc::size_t,
) -> bool {
    let result = lookup_publisher(publisher).and_then(|publisher| {
        if data.is_null() {
            return Err(ChannelError::NullPointer);
        }
        let payload = std::slice::from_raw_parts(data as *const u8, length);
        publisher.publish(payload)
    });

    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(%err, "publish failed");
            false
        }
    }
}

/// Returns `0` jika `channel` tidak valid
#[no_mangle]
pub extern "C" fn varcast_subscriber_create(channel: VarcastHandle) -> VarcastHandle {
    match lookup_channel(channel) {
        Ok(channel) => REGISTRY
            .lock()
            .insert(Entry::Subscriber(Arc::new(Mutex::new(channel.subscriber())))),
        Err(err) => {
            warn!(%err, "cannot create subscriber");
            0
        }
    }
}

/// # Safety
/// `subscriber` harus null atau pointer valid ke sebuah handle.
#[no_mangle]
pub unsafe extern "C" fn varcast_subscriber_destroy(subscriber: *mut VarcastHandle) {
    destroy(HandleKind::Subscriber, subscriber)
}

/// Cek apakah subscriber punya paket yang belum dibaca
#[no_mangle]
pub extern "C" fn varcast_subscriber_peek(subscriber: VarcastHandle) -> bool {
    match lookup_subscriber(subscriber) {
        Ok(subscriber) => subscriber.lock().peek(),
        Err(err) => {
            warn!(%err, "peek failed");
            false
        }
    }
}

/// Baca paket berikutnya, menunggu paling lama `time_ms` milidetik.
///
/// `time_ms < 0` menunggu tanpa batas, `0` tidak menunggu. Pointer yang
/// dikembalikan dimiliki subscriber dan valid sampai pembacaan berikutnya
/// atau sampai subscriber di-destroy.
///
/// # Safety
/// `out_data` dan `out_length` harus null atau pointer valid yang bisa ditulis.
#[no_mangle]
pub unsafe extern "C" fn varcast_read_wait_for(
    subscriber: VarcastHandle,
    out_data: *mut *const u8,
    out_length: *mut libc::size_t,
    time_ms: libc::c_int,
) -> bool {
    if out_data.is_null() || out_length.is_null() {
        return false;
    }

    let subscriber = match lookup_subscriber(subscriber) {
        Ok(subscriber) => subscriber,
        Err(err) => {
            warn!(%err, "read failed");
            return false;
        }
    };

    let mut subscriber = subscriber.lock();
    let data = if time_ms < 0 {
        Some(subscriber.read())
    } else {
        subscriber.read_timeout(Duration::from_millis(time_ms as u64))
    };

    match data {
        Some(data) => {
            *out_data = data.as_ptr();
            *out_length = data.len();
            true
        }
        None => false,
    }
}

/// Baca paket berikutnya tanpa menunggu
///
/// # Safety
/// Sama dengan [`varcast_read_wait_for`].
#[no_mangle]
pub unsafe extern "C" fn varcast_read(
    subscriber: VarcastHandle,
    out_data: *mut *const u8,
    out_length: *mut libc::size_t,
) -> bool {
    varcast_read_wait_for(subscriber, out_data, out_length, 0)
}
