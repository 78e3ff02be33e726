//! Column kernels for the flux solvers
//!
//! Every kernel works on a single column and a single g-point, with layers
//! ordered from the top of the atmosphere down: layer `i` is bounded by levels
//! `i` (above) and `i + 1` (below), so level `nlay` is the surface.

use smallvec::SmallVec;

/// Per-layer or per-level values of one column.
pub(crate) type ColumnBuf = SmallVec<[f64; 64]>;

/// Diffusivity secant for the single-angle longwave solver.
pub(crate) const LW_DIFFUSIVITY: f64 = 1.66;

/// Below this optical depth the linear-in-tau source uses its Taylor series.
const TAU_THRESH: f64 = 1.0e-8;

/// Reflectance and transmittance of each layer of a column.
#[derive(Debug, Default)]
pub(crate) struct TwoStream {
    /// Diffuse reflectance.
    pub(crate) rdif: ColumnBuf,
    /// Diffuse transmittance.
    pub(crate) tdif: ColumnBuf,
    /// Reflectance of the direct beam into diffuse radiation.
    pub(crate) rdir: ColumnBuf,
    /// Transmittance of the direct beam into diffuse radiation.
    pub(crate) tdir: ColumnBuf,
    /// Transmittance of the direct beam without scattering.
    pub(crate) tnoscat: ColumnBuf,
}

/// Two-stream layer properties for optical depth `tau`, single-scatter albedo
/// `ssa` and asymmetry `g`, using the practical improved flux method of
/// Zdunkowski et al. (1980).
///
/// For a sun at or below the horizon (`mu0 <= 0`) the direct beam terms are
/// zero.
pub(crate) fn sw_two_stream(tau: &[f64], ssa: &[f64], g: &[f64], mu0: f64) -> TwoStream {
    let nlay = tau.len();
    let mut out = TwoStream::default();

    for ilay in 0..nlay {
        let (tau, w0, g) = (tau[ilay], ssa[ilay], g[ilay]);

        let gamma1 = (8. - w0 * (5. + 3. * g)) * 0.25;
        let gamma2 = 3. * (w0 * (1. - g)) * 0.25;
        let k = ((gamma1 - gamma2) * (gamma1 + gamma2)).max(1e-12).sqrt();

        let exp_minusktau = (-tau * k).exp();
        let exp_minus2ktau = exp_minusktau * exp_minusktau;

        let rt_term = 1. / (k * (1. + exp_minus2ktau) + gamma1 * (1. - exp_minus2ktau));
        out.rdif.push(rt_term * gamma2 * (1. - exp_minus2ktau));
        out.tdif.push(rt_term * 2. * k * exp_minusktau);

        if mu0 <= 0. {
            out.rdir.push(0.);
            out.tdir.push(0.);
            out.tnoscat.push(0.);
            continue;
        }

        let gamma3 = (2. - 3. * mu0 * g) * 0.25;
        let gamma4 = 1. - gamma3;
        let alpha1 = gamma1 * gamma4 + gamma2 * gamma3;
        let alpha2 = gamma1 * gamma3 + gamma2 * gamma4;

        let tnoscat = (-tau / mu0).exp();
        let k_mu = k * mu0;
        let k_gamma3 = k * gamma3;
        let k_gamma4 = k * gamma4;

        // Avoid the singularity at k * mu0 = 1
        let denom = 1. - k_mu * k_mu;
        let denom = if denom.abs() >= f64::EPSILON {
            denom
        } else {
            f64::EPSILON
        };
        let rt_term = w0 * rt_term / denom;

        let rdir = rt_term
            * ((1. - k_mu) * (alpha2 + k_gamma3)
                - (1. + k_mu) * (alpha2 - k_gamma3) * exp_minus2ktau
                - 2. * (k_gamma3 - alpha2 * k_mu) * exp_minusktau * tnoscat);
        let tdir = -rt_term
            * ((1. + k_mu) * (alpha1 + k_gamma4) * tnoscat
                - (1. - k_mu) * (alpha1 - k_gamma4) * exp_minus2ktau * tnoscat
                - 2. * (k_gamma4 + alpha1 * k_mu) * exp_minusktau);

        // Energy conservation can be violated slightly by rounding
        let rdir = rdir.min(1. - tnoscat).max(0.);
        let tdir = tdir.min(1. - tnoscat - rdir).max(0.);

        out.rdir.push(rdir);
        out.tdir.push(tdir);
        out.tnoscat.push(tnoscat);
    }
    out
}

/// Direct beam flux at each level and the diffuse sources it generates.
///
/// `flux_dir_top` is the direct flux on a horizontal surface at the top of
/// the atmosphere. Returns (`flux_dir`, `source_up`, `source_dn`,
/// `source_sfc`), where the level fluxes have length `nlay + 1`.
pub(crate) fn sw_source_2str(
    layers: &TwoStream,
    sfc_alb_dir: f64,
    flux_dir_top: f64,
) -> (ColumnBuf, ColumnBuf, ColumnBuf, f64) {
    let nlay = layers.tnoscat.len();
    let mut flux_dir = ColumnBuf::with_capacity(nlay + 1);
    let mut source_up = ColumnBuf::with_capacity(nlay);
    let mut source_dn = ColumnBuf::with_capacity(nlay);

    flux_dir.push(flux_dir_top);
    for ilay in 0..nlay {
        let incident = flux_dir[ilay];
        source_up.push(layers.rdir[ilay] * incident);
        source_dn.push(layers.tdir[ilay] * incident);
        flux_dir.push(layers.tnoscat[ilay] * incident);
    }
    let source_sfc = flux_dir[nlay] * sfc_alb_dir;

    (flux_dir, source_up, source_dn, source_sfc)
}

/// Diffuse fluxes by the adding method (Shonk and Hogan, 2008).
///
/// `flux_dn_top` is the diffuse downward flux at the top of the atmosphere.
/// Returns (`flux_up`, `flux_dn`) at every level.
pub(crate) fn adding(
    layers: &TwoStream,
    sfc_alb_dif: f64,
    source_up: &[f64],
    source_dn: &[f64],
    source_sfc: f64,
    flux_dn_top: f64,
) -> (ColumnBuf, ColumnBuf) {
    let nlay = layers.rdif.len();
    let nlev = nlay + 1;

    // Albedo of the whole column below each level, and the upward flux each
    // level sees from sources below it
    let mut albedo: ColumnBuf = SmallVec::from_elem(0., nlev);
    let mut src: ColumnBuf = SmallVec::from_elem(0., nlev);
    let mut denom: ColumnBuf = SmallVec::from_elem(0., nlay);

    albedo[nlay] = sfc_alb_dif;
    src[nlay] = source_sfc;
    for ilay in (0..nlay).rev() {
        let (rdif, tdif) = (layers.rdif[ilay], layers.tdif[ilay]);
        denom[ilay] = 1. / (1. - rdif * albedo[ilay + 1]);
        albedo[ilay] = rdif + tdif * tdif * albedo[ilay + 1] * denom[ilay];
        src[ilay] =
            source_up[ilay] + tdif * denom[ilay] * (src[ilay + 1] + albedo[ilay + 1] * source_dn[ilay]);
    }

    let mut flux_up: ColumnBuf = SmallVec::from_elem(0., nlev);
    let mut flux_dn: ColumnBuf = SmallVec::from_elem(0., nlev);
    flux_dn[0] = flux_dn_top;
    flux_up[0] = flux_dn[0] * albedo[0] + src[0];
    for ilev in 1..nlev {
        let ilay = ilev - 1;
        flux_dn[ilev] = (layers.tdif[ilay] * flux_dn[ilay]
            + layers.rdif[ilay] * src[ilev]
            + source_dn[ilay])
            * denom[ilay];
        flux_up[ilev] = flux_dn[ilev] * albedo[ilev] + src[ilev];
    }

    (flux_up, flux_dn)
}

/// Longwave sources of one column for a given set of level sources.
pub(crate) struct LwColumnSources<'a> {
    pub(crate) lay_source: &'a [f64],
    /// Planck source at the lower boundary of each layer, seen by radiation
    /// moving down.
    pub(crate) lev_source_dn: &'a [f64],
    /// Planck source at the upper boundary of each layer, seen by radiation
    /// moving up.
    pub(crate) lev_source_up: &'a [f64],
    pub(crate) sfc_source: f64,
}

/// Longwave fluxes without scattering, using a single angle with diffusivity
/// secant [`LW_DIFFUSIVITY`] and a source linear in optical depth.
///
/// `flux_dn_top` is the incident downward flux at the top of the atmosphere.
/// Returns (`flux_up`, `flux_dn`) at every level.
pub(crate) fn lw_solver_noscat(
    tau: &[f64],
    sources: &LwColumnSources,
    sfc_emis: f64,
    flux_dn_top: f64,
) -> (ColumnBuf, ColumnBuf) {
    let nlay = tau.len();
    let nlev = nlay + 1;

    let mut trans = ColumnBuf::with_capacity(nlay);
    let mut source_up = ColumnBuf::with_capacity(nlay);
    let mut source_dn = ColumnBuf::with_capacity(nlay);
    for ilay in 0..nlay {
        let tau_loc = tau[ilay] * LW_DIFFUSIVITY;
        let t = (-tau_loc).exp();
        let fact = if tau_loc > TAU_THRESH {
            (1. - t) / tau_loc - t
        } else {
            tau_loc * (0.5 - tau_loc / 3.)
        };
        let lay = sources.lay_source[ilay];
        let (lev_dn, lev_up) = (sources.lev_source_dn[ilay], sources.lev_source_up[ilay]);

        trans.push(t);
        source_dn.push((1. - t) * lev_dn + 2. * fact * (lay - lev_dn));
        source_up.push((1. - t) * lev_up + 2. * fact * (lay - lev_up));
    }

    // Work in radiance; a single angle with weight 1/2 turns it into flux
    // with a factor of pi
    let pi = std::f64::consts::PI;
    let mut radn_dn: ColumnBuf = SmallVec::from_elem(0., nlev);
    let mut radn_up: ColumnBuf = SmallVec::from_elem(0., nlev);

    radn_dn[0] = flux_dn_top / pi;
    for ilay in 0..nlay {
        radn_dn[ilay + 1] = trans[ilay] * radn_dn[ilay] + source_dn[ilay];
    }

    radn_up[nlay] = radn_dn[nlay] * (1. - sfc_emis) + sfc_emis * sources.sfc_source;
    for ilay in (0..nlay).rev() {
        radn_up[ilay] = trans[ilay] * radn_up[ilay + 1] + source_up[ilay];
    }

    let to_flux = |radn: ColumnBuf| -> ColumnBuf { radn.into_iter().map(|r| r * pi).collect() };
    (to_flux(radn_up), to_flux(radn_dn))
}
