#![no_main]
use libfuzzer_sys::fuzz_target;

use covtrend::model::Ratio;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Some(ratio) = Ratio::parse(s) {
            // Percentages stay in range and the display form re-parses.
            assert!(ratio.percentage() <= 100);
            if ratio.numerator().is_finite() && ratio.denominator().is_finite() {
                assert_eq!(Ratio::parse(&ratio.to_string()), Some(ratio));
            }
        }
    }
});
