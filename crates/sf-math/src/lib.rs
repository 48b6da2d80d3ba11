//! sf-math: numerical collaborators for the Soundfield workspace
//!
//! - Spherical and cylindrical Bessel/Hankel functions with derivatives
//! - Real spherical-harmonic basis matrices (ACN/N3D) up to 7th order
//! - Legendre polynomials and max-rE order weights
//! - Moore-Penrose pseudo-inverse (nalgebra SVD)
//! - Fibonacci-sphere direction grids
//! - Diffuse-field coherence model

mod bessel;
mod diffuse;
mod grid;
mod pinv;
mod sh;

pub use bessel::{
    bessel_j, bessel_j_deriv, bessel_y, bessel_y_deriv, hankel2, hankel2_deriv, sph_bessel_j,
    sph_bessel_j_deriv, sph_bessel_y, sph_bessel_y_deriv, sph_hankel2, sph_hankel2_deriv,
};
pub use diffuse::diffuse_coherence_matrix;
pub use grid::fibonacci_sphere;
pub use pinv::pseudo_inverse;
pub use sh::{legendre_column, legendre_p, max_re_weights, real_sh_matrix, real_sh_vector};
