//! Order number validation.

/// Checks an order number against the Luhn checksum.
///
/// The number must be a non-empty string of ASCII digits. Starting from the
/// rightmost (check) digit, every second digit is doubled, and 9 is
/// subtracted from doubled digits greater than 9. The number is valid when
/// the total is a multiple of 10.
pub fn is_valid_luhn(number: &str) -> bool {
	if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
		return false;
	}

	luhn_sum(number) % 10 == 0
}

fn luhn_sum(number: &str) -> u32 {
	number
		.bytes()
		.rev()
		.enumerate()
		.map(|(position, byte)| {
			let digit = u32::from(byte - b'0');
			if position % 2 == 1 {
				let doubled = digit * 2;
				if doubled > 9 {
					doubled - 9
				} else {
					doubled
				}
			} else {
				digit
			}
		})
		.sum()
}
