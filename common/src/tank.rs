/// Temperature above which a sensor's layer counts as usable hot water.
pub const USABLE_TEMP_C: f32 = 40.0;

const LAYER_SHARES: [u8; 3] = [33, 33, 34];

/// Rough hot-water level from the three stratified sensors (bottom, middle,
/// top). Each layer above [`USABLE_TEMP_C`] adds its fixed share. This is a
/// stratification heuristic, not a volume measurement.
pub fn hot_water_level_pct(s2: f32, s3: f32, s4: f32) -> u8 {
    [s2, s3, s4]
        .into_iter()
        .zip(LAYER_SHARES)
        .filter(|(temp, _)| *temp > USABLE_TEMP_C)
        .map(|(_, share)| share)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_counts_hot_layers() {
        assert_eq!(hot_water_level_pct(20.0, 30.0, 39.9), 0);
        assert_eq!(hot_water_level_pct(20.0, 30.0, 55.0), 34);
        assert_eq!(hot_water_level_pct(20.0, 45.0, 55.0), 67);
        assert_eq!(hot_water_level_pct(41.0, 45.0, 55.0), 100);
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(hot_water_level_pct(40.0, 40.0, 40.0), 0);
    }
}
