pub mod course;
pub mod enrollment;
pub mod gamification;
pub mod quiz;

/// Integer percentage rounded half-up. Returns 0 when `whole` is 0.
pub fn rounded_percentage(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part.min(whole));
    let whole = u64::from(whole);
    // (100 * part / whole) + 0.5, kept in integers
    ((200 * part + whole) / (2 * whole)) as u8
}
