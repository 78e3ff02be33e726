//! Reduction of g-point fluxes
//!
//! The solvers produce fluxes at every g-point; a [`FluxReduce`] implementation
//! decides what is kept. Net flux is always `up - down`, with the direct beam
//! included in the downward flux.

use ndarray::{Array2, Array3, ArrayView3, Axis};

use crate::error::{check_shape, Result};
use crate::optics::SpectralDisc;

/// Reduces fluxes dimensioned as (`ncol`, `nlev`, `ngpt`).
pub trait FluxReduce {
    /// `gpt_flux_dn` includes the direct beam, which is also passed on its
    /// own as `gpt_flux_dn_dir` by the shortwave solver.
    fn reduce(
        &mut self,
        gpt_flux_up: ArrayView3<f64>,
        gpt_flux_dn: ArrayView3<f64>,
        spectral: &SpectralDisc,
        gpt_flux_dn_dir: Option<ArrayView3<f64>>,
    ) -> Result<()>;
}

/// Fluxes summed over all g-points, each dimensioned as (`ncol`, `nlev`).
#[derive(Debug, Clone, PartialEq)]
pub struct FluxesBroadband {
    pub flux_up: Array2<f64>,
    pub flux_dn: Array2<f64>,
    pub flux_net: Array2<f64>,
    /// Direct beam flux; only set by the shortwave solver.
    pub flux_dn_dir: Option<Array2<f64>>,
}

impl FluxesBroadband {
    pub fn new(ncol: usize, nlev: usize) -> Self {
        Self {
            flux_up: Array2::zeros((ncol, nlev)),
            flux_dn: Array2::zeros((ncol, nlev)),
            flux_net: Array2::zeros((ncol, nlev)),
            flux_dn_dir: None,
        }
    }
}

impl FluxReduce for FluxesBroadband {
    fn reduce(
        &mut self,
        gpt_flux_up: ArrayView3<f64>,
        gpt_flux_dn: ArrayView3<f64>,
        spectral: &SpectralDisc,
        gpt_flux_dn_dir: Option<ArrayView3<f64>>,
    ) -> Result<()> {
        let (ncol, nlev) = self.flux_up.dim();
        let expected = [ncol, nlev, spectral.ngpt()];
        check_shape("gpt_flux_up", &expected, gpt_flux_up.shape())?;
        check_shape("gpt_flux_dn", &expected, gpt_flux_dn.shape())?;
        if let Some(dir) = gpt_flux_dn_dir {
            check_shape("gpt_flux_dn_dir", &expected, dir.shape())?;
        }

        self.flux_up = gpt_flux_up.sum_axis(Axis(2));
        self.flux_dn = gpt_flux_dn.sum_axis(Axis(2));
        self.flux_net = &self.flux_up - &self.flux_dn;
        self.flux_dn_dir = gpt_flux_dn_dir.map(|dir| dir.sum_axis(Axis(2)));
        Ok(())
    }
}

/// Fluxes summed over each band, each dimensioned as (`ncol`, `nlev`,
/// `nband`), together with the broadband fluxes.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxesByband {
    pub broadband: FluxesBroadband,
    pub bnd_flux_up: Array3<f64>,
    pub bnd_flux_dn: Array3<f64>,
    pub bnd_flux_net: Array3<f64>,
    pub bnd_flux_dn_dir: Option<Array3<f64>>,
}

impl FluxesByband {
    pub fn new(ncol: usize, nlev: usize, nband: usize) -> Self {
        Self {
            broadband: FluxesBroadband::new(ncol, nlev),
            bnd_flux_up: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_dn: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_net: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_dn_dir: None,
        }
    }
}

/// Sum `gpt_flux` over the g-points of each band.
fn sum_byband(gpt_flux: ArrayView3<f64>, spectral: &SpectralDisc) -> Array3<f64> {
    let (ncol, nlev, _) = gpt_flux.dim();
    let mut bnd_flux = Array3::zeros((ncol, nlev, spectral.nband()));
    for (iband, mut bnd) in bnd_flux.axis_iter_mut(Axis(2)).enumerate() {
        let gpts = spectral.gpts(iband);
        for igpt in gpts {
            bnd += &gpt_flux.index_axis(Axis(2), igpt);
        }
    }
    bnd_flux
}

impl FluxReduce for FluxesByband {
    fn reduce(
        &mut self,
        gpt_flux_up: ArrayView3<f64>,
        gpt_flux_dn: ArrayView3<f64>,
        spectral: &SpectralDisc,
        gpt_flux_dn_dir: Option<ArrayView3<f64>>,
    ) -> Result<()> {
        let (ncol, nlev, nband) = self.bnd_flux_up.dim();
        check_shape("bnd_flux_up", &[ncol, nlev, spectral.nband()], &[ncol, nlev, nband])?;
        self.broadband
            .reduce(gpt_flux_up, gpt_flux_dn, spectral, gpt_flux_dn_dir)?;

        self.bnd_flux_up = sum_byband(gpt_flux_up, spectral);
        self.bnd_flux_dn = sum_byband(gpt_flux_dn, spectral);
        self.bnd_flux_net = &self.bnd_flux_up - &self.bnd_flux_dn;
        self.bnd_flux_dn_dir = gpt_flux_dn_dir.map(|dir| sum_byband(dir, spectral));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::tests::three_bands;
    use approx::assert_relative_eq;

    fn gpt_fluxes() -> (Array3<f64>, Array3<f64>) {
        let up = Array3::from_shape_fn((2, 3, 6), |(icol, ilev, igpt)| {
            0.1 * (icol + 1) as f64 + 1.7 * ilev as f64 + (igpt as f64).sqrt()
        });
        let dn = Array3::from_shape_fn((2, 3, 6), |(icol, ilev, igpt)| {
            3. * (igpt + icol) as f64 / (ilev + 1) as f64
        });
        (up, dn)
    }

    #[test]
    fn band_sums_add_up_to_broadband() {
        let (up, dn) = gpt_fluxes();
        let mut fluxes = FluxesByband::new(2, 3, 3);
        fluxes
            .reduce(up.view(), dn.view(), &three_bands(), Some(dn.view()))
            .unwrap();

        let summed_up = fluxes.bnd_flux_up.sum_axis(Axis(2));
        let summed_net = fluxes.bnd_flux_net.sum_axis(Axis(2));
        for ((a, b), (c, d)) in summed_up
            .iter()
            .zip(&fluxes.broadband.flux_up)
            .zip(summed_net.iter().zip(&fluxes.broadband.flux_net))
        {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
            assert_relative_eq!(*c, *d, max_relative = 1e-12, epsilon = 1e-12);
        }
        // The middle band holds g-points 2..=4
        assert_relative_eq!(
            fluxes.bnd_flux_dn[[1, 2, 1]],
            dn[[1, 2, 2]] + dn[[1, 2, 3]] + dn[[1, 2, 4]]
        );
        assert!(fluxes.bnd_flux_dn_dir.is_some());
    }

    #[test]
    fn net_is_up_minus_down() {
        let (up, dn) = gpt_fluxes();
        let mut fluxes = FluxesBroadband::new(2, 3);
        fluxes.reduce(up.view(), dn.view(), &three_bands(), None).unwrap();

        for ((net, up), dn) in fluxes
            .flux_net
            .iter()
            .zip(&fluxes.flux_up)
            .zip(&fluxes.flux_dn)
        {
            assert_eq!(*net, up - dn);
        }
        assert!(fluxes.flux_dn_dir.is_none());
    }

    #[test]
    fn wrong_shape() {
        let (up, dn) = gpt_fluxes();
        let mut fluxes = FluxesBroadband::new(2, 4);
        assert!(fluxes
            .reduce(up.view(), dn.view(), &three_bands(), None)
            .is_err());
    }
}
