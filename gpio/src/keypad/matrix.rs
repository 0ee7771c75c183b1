use crate::{GpioBusInput, GpioBusOutput, GpioResult};
use log::trace;

/// Weight of each row in the row code, and of each column in the column code.
///
/// Every weight is a nibble with exactly one bit cleared, which is what an idle-high
/// 4-bit port reads with one line pulled low.
pub const LINE_WEIGHTS: [u8; 4] = [14, 13, 11, 7];

/// Which keys of a 4x4 matrix are held, as seen by one column-strobe scan.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanMatrix {
    pressed: [[bool; 4]; 4],
}

impl ScanMatrix {
    pub fn new(pressed: [[bool; 4]; 4]) -> Self {
        Self { pressed }
    }

    /// Scans the matrix by strobing one column at a time and sampling all rows.
    ///
    /// Each column is activated while the others are released, then released again before the
    /// next one, so the bus is left fully released afterwards.
    pub fn scan(cols: &dyn GpioBusOutput<4>, rows: &dyn GpioBusInput<4>) -> GpioResult<Self> {
        let mut pressed = [[false; 4]; 4];

        for col in 0..4 {
            cols.write_one_hot(col)?;
            let values = rows.read();
            cols.release()?;
            for (row, &value) in values?.iter().enumerate() {
                pressed[row][col] = value;
            }
        }

        let matrix = Self { pressed };
        trace!("Scanned {:?}", matrix);
        Ok(matrix)
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        row < 4 && col < 4 && self.pressed[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, pressed: bool) {
        self.pressed[row][col] = pressed;
    }

    /// Iterates over the (row, column) positions of the held keys, row by row.
    pub fn pressed(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..4)
            .flat_map(|row| (0..4).map(move |col| (row, col)))
            .filter(|&(row, col)| self.pressed[row][col])
    }

    pub fn is_empty(&self) -> bool {
        self.pressed().next().is_none()
    }

    /// Encodes the matrix into its row and column codes.
    pub fn scan_code(&self) -> ScanCode {
        let mut row_sum = 0u16;
        let mut col_sum = 0u16;
        for row in 0..4 {
            if self.pressed[row].iter().any(|&p| p) {
                row_sum += LINE_WEIGHTS[row] as u16;
            }
        }
        for col in 0..4 {
            if (0..4).any(|row| self.pressed[row][col]) {
                col_sum += LINE_WEIGHTS[col] as u16;
            }
        }
        ScanCode {
            row: row_sum as u8,
            // Truncated to the register width, several column sets alias.
            col: (col_sum << 4) as u8,
        }
    }
}

/// The two register values derived from a [ScanMatrix].
///
/// The codes are sums of [LINE_WEIGHTS] over every line with at least one held key, so
/// multi-key chords map many-to-one onto the same codes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanCode {
    /// Weighted sum of the rows holding a key.
    pub row: u8,
    /// Weighted sum of the columns holding a key, shifted into the high nibble.
    pub col: u8,
}

impl ScanCode {
    /// Whether no key at all was held.
    pub fn is_idle(&self) -> bool {
        self.row == 0 && self.col == 0
    }
}
