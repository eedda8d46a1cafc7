//! End-to-end scenarios driven against the mock transport: the full SPL
//! upload/execute/handshake sequence (with and without swap-buffer
//! relocation) and the MMU manager's "boot ROM left the MMU off" path.

use fel::loader;
use fel::mmu;
use fel::soc;
use fel::usb::mock::MockTransport;

const STATUS_OK: &[u8; 13] = b"AWUS_________";
const FEL_STATUS: &[u8; 8] = &[0u8; 8];

/// One `protocol::write` round trip: request status, payload status, then
/// the trailing 8-byte FEL status read (and its own status).
fn queue_write_op(t: &mut MockTransport) {
    t.queue_recv(STATUS_OK);
    t.queue_recv(STATUS_OK);
    t.queue_recv(FEL_STATUS);
    t.queue_recv(STATUS_OK);
}

/// One `protocol::execute` round trip: request status, then the trailing
/// FEL status read.
fn queue_execute_op(t: &mut MockTransport) {
    t.queue_recv(STATUS_OK);
    t.queue_recv(FEL_STATUS);
    t.queue_recv(STATUS_OK);
}

/// One `protocol::read` round trip: request status, the data plus its
/// status, then the trailing FEL status read.
fn queue_read_op(t: &mut MockTransport, data: &[u8]) {
    t.queue_recv(STATUS_OK);
    t.queue_recv(data);
    t.queue_recv(STATUS_OK);
    t.queue_recv(FEL_STATUS);
    t.queue_recv(STATUS_OK);
}

/// One thunk round trip with no readback: upload the code, then execute it.
fn queue_execute_thunk(t: &mut MockTransport) {
    queue_write_op(t);
    queue_execute_op(t);
}

/// A thunk round trip followed by a result read (`coproc_read`, `readl_n`, …).
fn queue_thunk_and_read_round(t: &mut MockTransport, data: &[u8]) {
    queue_execute_thunk(t);
    queue_read_op(t, data);
}

/// Builds a minimal eGON/SPL header buffer of `total_length` bytes whose
/// checksum invariant holds, so [`fel::image::parse_egon`] accepts it.
fn build_valid_egon(total_length: u32) -> Vec<u8> {
    const SEED: u32 = 0x5F0A_6C39;
    let mut buf = vec![0u8; total_length as usize];
    buf[4..12].copy_from_slice(b"eGON.BT0");
    buf[16..20].copy_from_slice(&total_length.to_le_bytes());
    buf[12..16].copy_from_slice(&0u32.to_le_bytes());
    let sum = buf
        .chunks_exact(4)
        .fold(0u32, |acc, w| acc.wrapping_add(u32::from_le_bytes(w.try_into().unwrap())));
    let stored = SEED.wrapping_add(sum);
    buf[12..16].copy_from_slice(&stored.to_le_bytes());
    buf
}

#[test]
fn load_spl_handshake_succeeds_with_no_swap_buffers() {
    let soc = soc::resolve(0x1623).unwrap(); // A10: no L2 enable, no swap buffers, no MMU table
    let image = build_valid_egon(0x1000);
    let mut t = MockTransport::default();

    // stack_probe: thunk exec + 8-byte SP/SP_irq read.
    queue_thunk_and_read_round(&mut t, &[0u8; 8]);
    // upload_relocating: the whole payload lands directly (no swap buffers).
    queue_write_op(&mut t);
    // install_and_run_thunk: write the handoff thunk, then execute it.
    queue_execute_thunk(&mut t);
    // handshake read at spl_addr+4.
    queue_read_op(&mut t, b"eGON.FEL");

    let (load, header) = loader::load_spl(&mut t, soc, &image, None).unwrap();
    assert_eq!(load.entry, soc.spl_addr);
    assert_eq!(load.size, 0x1000);
    assert_eq!(header.total_length, 0x1000);
}

#[test]
fn load_spl_reports_handshake_failure_on_unexpected_tag() {
    let soc = soc::resolve(0x1623).unwrap();
    let image = build_valid_egon(0x1000);
    let mut t = MockTransport::default();

    queue_thunk_and_read_round(&mut t, &[0u8; 8]);
    queue_write_op(&mut t);
    queue_execute_thunk(&mut t);
    queue_read_op(&mut t, b"eGON.BT0"); // SPL never rewrote the tag

    let err = loader::load_spl(&mut t, soc, &image, None).unwrap_err();
    assert!(matches!(err, fel::Error::HandshakeFailed(tag) if &tag == b"eGON.BT0"));
}

#[test]
fn load_spl_relocates_bytes_overlapping_the_swap_buffer() {
    // A20: needs L2 enable, one swap buffer {buf1: 0x5c00, buf2: 0x5800, size: 0x400}.
    let soc = soc::resolve(0x1639).unwrap();
    let swap = soc.swap_buffers[0];
    let total_length = swap.buf1 + swap.size; // exactly covers the direct prefix + one relocated round
    let image = build_valid_egon(total_length);
    let mut t = MockTransport::default();

    queue_execute_thunk(&mut t); // l2_enable: no readback
    queue_thunk_and_read_round(&mut t, &[0u8; 8]); // stack_probe
    queue_write_op(&mut t); // direct prefix [0, buf1)
    queue_write_op(&mut t); // relocated [buf1, buf1+size) -> buf2
    queue_execute_thunk(&mut t); // install_and_run_thunk
    queue_read_op(&mut t, b"eGON.FEL"); // handshake

    let (load, _header) = loader::load_spl(&mut t, soc, &image, None).unwrap();
    assert_eq!(load.entry, soc.spl_addr);
    assert_eq!(load.size, total_length);
}

#[test]
fn backup_and_disable_mmu_synthesizes_a_flat_table_when_mmu_is_off() {
    // A64 carries mmu_tt_addr; SCTLR with M=0 means the boot ROM never
    // turned the MMU on, so the manager must synthesize a table instead of
    // reading one back from the device.
    let soc = soc::resolve(0x1651).unwrap();
    let mut t = MockTransport::default();

    let sctlr_off = 0x00C5_0038u32; // SCTLR_EXPECTED, M bit already clear
    queue_thunk_and_read_round(&mut t, &sctlr_off.to_le_bytes()); // SCTLR
    queue_thunk_and_read_round(&mut t, &0u32.to_le_bytes()); // DACR
    queue_thunk_and_read_round(&mut t, &0u32.to_le_bytes()); // TTBCR
    queue_thunk_and_read_round(&mut t, &0u32.to_le_bytes()); // TTBR0

    let state = mmu::backup_and_disable_mmu(&mut t, soc).unwrap();
    assert!(!state.was_enabled);
    assert_eq!(state.table, mmu::synthesize_flat_table());
    assert_eq!(state.table.len(), 4096);
}

#[test]
fn backup_and_disable_mmu_rejects_an_unexpected_register_shape() {
    let soc = soc::resolve(0x1651).unwrap();
    let mut t = MockTransport::default();

    let sctlr_on = 0x00C5_0039u32; // M bit set, but otherwise matches SCTLR_EXPECTED
    queue_thunk_and_read_round(&mut t, &sctlr_on.to_le_bytes()); // SCTLR
    queue_thunk_and_read_round(&mut t, &0u32.to_le_bytes()); // DACR: wrong, not 0x55555555
    queue_thunk_and_read_round(&mut t, &0u32.to_le_bytes()); // TTBCR
    queue_thunk_and_read_round(&mut t, &0x4000_0000u32.to_le_bytes()); // TTBR0

    let err = mmu::backup_and_disable_mmu(&mut t, soc).unwrap_err();
    assert!(matches!(err, fel::Error::UnexpectedMmuState(_)));
}
