//! Host math values.
//!
//! Pack only serializes the scalar components of these types. The one piece
//! of arithmetic carried here is the rotation conversion the CFrame encoding
//! needs: rotation matrix to quaternion and back, and the table of the 24
//! axis-aligned rotations.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vector2Int16 {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vector3Int16 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// RGB color with components nominally in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color3 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color3 {
    /// Builds a color from 8-bit channels.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }
}

/// One dimension of a UI coordinate: relative scale plus pixel offset.
///
/// The wire format stores the offset as an `i16`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UDim {
    pub scale: f32,
    pub offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UDim2 {
    pub x: UDim,
    pub y: UDim,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region3 {
    pub min: Vector3,
    pub max: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region3Int16 {
    pub min: Vector3Int16,
    pub max: Vector3Int16,
}

/// Row-major 3×3 rotation matrix.
pub type Rotation = [[f32; 3]; 3];

/// Quaternion as `[x, y, z, w]`.
pub type Quaternion = [f64; 4];

const AXIS_TOLERANCE: f32 = 1e-4;

/// A coordinate frame: position plus rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CFrame {
    pub position: Vector3,
    pub rotation: Rotation,
}

impl Default for CFrame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CFrame {
    pub const IDENTITY: CFrame = CFrame {
        position: Vector3::new(0.0, 0.0, 0.0),
        rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// A translation with no rotation.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            ..Self::IDENTITY
        }
    }

    /// Builds a frame from a (not necessarily normalized) quaternion.
    pub fn from_quaternion(position: Vector3, q: Quaternion) -> Self {
        let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        let [x, y, z, w] = if len > 0.0 {
            [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
        } else {
            [0.0, 0.0, 0.0, 1.0]
        };
        let rotation = [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - z * w),
                2.0 * (x * z + y * w),
            ],
            [
                2.0 * (x * y + z * w),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - x * w),
            ],
            [
                2.0 * (x * z - y * w),
                2.0 * (y * z + x * w),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ];
        Self {
            position,
            rotation: rotation.map(|row| row.map(|c| c as f32)),
        }
    }

    /// Unit quaternion for the rotation part.
    pub fn to_quaternion(&self) -> Quaternion {
        let r = self.rotation.map(|row| row.map(|c| c as f64));
        let trace = r[0][0] + r[1][1] + r[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            [
                (r[2][1] - r[1][2]) / s,
                (r[0][2] - r[2][0]) / s,
                (r[1][0] - r[0][1]) / s,
                0.25 * s,
            ]
        } else if r[0][0] > r[1][1] && r[0][0] > r[2][2] {
            let s = (1.0 + r[0][0] - r[1][1] - r[2][2]).sqrt() * 2.0;
            [
                0.25 * s,
                (r[0][1] + r[1][0]) / s,
                (r[0][2] + r[2][0]) / s,
                (r[2][1] - r[1][2]) / s,
            ]
        } else if r[1][1] > r[2][2] {
            let s = (1.0 + r[1][1] - r[0][0] - r[2][2]).sqrt() * 2.0;
            [
                (r[0][1] + r[1][0]) / s,
                0.25 * s,
                (r[1][2] + r[2][1]) / s,
                (r[0][2] - r[2][0]) / s,
            ]
        } else {
            let s = (1.0 + r[2][2] - r[0][0] - r[1][1]).sqrt() * 2.0;
            [
                (r[0][2] + r[2][0]) / s,
                (r[1][2] + r[2][1]) / s,
                0.25 * s,
                (r[1][0] - r[0][1]) / s,
            ]
        };
        let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        q.map(|c| c / len)
    }

    /// Index into [`axis_aligned_rotations`] when the rotation maps every
    /// axis onto a (signed) axis.
    pub fn axis_aligned_index(&self) -> Option<u8> {
        axis_aligned_rotations()
            .iter()
            .position(|candidate| {
                candidate.iter().zip(self.rotation.iter()).all(|(a, b)| {
                    a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| (x - y).abs() < AXIS_TOLERANCE)
                })
            })
            .map(|i| i as u8)
    }
}

/// The 24 proper rotations whose matrices are signed permutations, in a
/// fixed order starting with the identity.
pub fn axis_aligned_rotations() -> &'static [Rotation; 24] {
    static TABLE: OnceLock<[Rotation; 24]> = OnceLock::new();
    TABLE.get_or_init(|| {
        const PERMUTATIONS: [([usize; 3], f32); 6] = [
            ([0, 1, 2], 1.0),
            ([0, 2, 1], -1.0),
            ([1, 0, 2], -1.0),
            ([1, 2, 0], 1.0),
            ([2, 0, 1], 1.0),
            ([2, 1, 0], -1.0),
        ];
        let mut table = [[[0.0f32; 3]; 3]; 24];
        let mut next = 0;
        for (perm, parity) in PERMUTATIONS {
            for signs in 0..8u8 {
                let sign = |i: usize| if signs >> i & 1 == 1 { -1.0 } else { 1.0 };
                if parity * sign(0) * sign(1) * sign(2) < 0.0 {
                    continue;
                }
                let mut m = [[0.0f32; 3]; 3];
                for row in 0..3 {
                    m[row][perm[row]] = sign(row);
                }
                table[next] = m;
                next += 1;
            }
        }
        table
    })
}
