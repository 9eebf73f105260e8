use super::{
    default_field, ensure_id, field, is_blank, require, set, today, Clinic, ClinicError,
    ClinicResult, Session, ACTIVE, ADMIN_ROLE, STAFF_ROLE,
};
use crate::entities::{CUSTOMER, STAFF};
use crate::ids::generate_id;
use crate::mapping::{normalize_phone, Record};

const NEW_CUSTOMER: &str = "Mới";
const DEFAULT_COMMISSION: &str = "10";

/// Columns any signed-in staff member may see about colleagues.
const PUBLIC_STAFF_FIELDS: [&str; 5] = ["maNhanVien", "hoVaTen", "chucVu", "chuyenMon", "trangThai"];

impl Clinic {
    /// Who is acting, looked up by sign-in email.
    ///
    /// The configured owner is always Admin. Anyone else needs an active row in
    /// the staff sheet; `None` means the caller must be turned away.
    pub async fn resolve_session(&self, email: &str) -> ClinicResult<Option<Session>> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }

        let staff = self.list(&STAFF).await?;
        let row = staff
            .iter()
            .find(|s| field(s, "email").eq_ignore_ascii_case(email));

        if self
            .owner_email
            .as_deref()
            .is_some_and(|owner| owner.eq_ignore_ascii_case(email))
        {
            return Ok(Some(Session {
                id: row.map(|r| field(r, "maNhanVien")).unwrap_or("ADMIN").to_string(),
                name: row
                    .map(|r| field(r, "hoVaTen"))
                    .filter(|n| !n.is_empty())
                    .unwrap_or("Quản trị viên")
                    .to_string(),
                email: email.to_string(),
                role: ADMIN_ROLE.to_string(),
            }));
        }

        let Some(row) = row else {
            tracing::warn!(target: "http", "sign-in rejected: {email} is not on the staff sheet");
            return Ok(None);
        };
        if field(row, "trangThai") != ACTIVE {
            tracing::warn!(target: "http", "sign-in rejected: {email} is not active");
            return Ok(None);
        }

        let role = match field(row, "quyenHan") {
            "" => STAFF_ROLE,
            r => r,
        };
        Ok(Some(Session {
            id: field(row, "maNhanVien").to_string(),
            name: field(row, "hoVaTen").to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }))
    }

    /* ---- customers ---- */

    pub async fn list_customers(&self) -> ClinicResult<Vec<Record>> {
        self.list(&CUSTOMER).await
    }

    pub async fn get_customer(&self, id: &str) -> ClinicResult<Record> {
        self.fetch(&CUSTOMER, id, "Không tìm thấy khách hàng").await
    }

    pub async fn create_customer(&self, mut data: Record) -> ClinicResult<Record> {
        require(&data, &["hoVaTen", "soDienThoai"], "Thiếu thông tin bắt buộc")?;

        let phone = normalize_phone(field(&data, "soDienThoai"));
        let customers = self.list(&CUSTOMER).await?;
        if customers.iter().any(|c| field(c, "soDienThoai") == phone) {
            return Err(ClinicError::BadRequest("Số điện thoại đã tồn tại".into()));
        }

        ensure_id(&mut data, &CUSTOMER);
        set(&mut data, "ngayTao", today());
        default_field(&mut data, "trangThai", NEW_CUSTOMER);

        self.insert(&CUSTOMER, &data).await?;
        Ok(data)
    }

    pub async fn update_customer(&self, id: &str, updates: Record) -> ClinicResult<Record> {
        if !self.patch(&CUSTOMER, id, updates).await? {
            return Err(ClinicError::NotFound("Không tìm thấy khách hàng".into()));
        }
        self.get_customer(id).await
    }

    pub async fn delete_customer(&self, session: &Session, id: &str) -> ClinicResult<()> {
        session.require_admin()?;
        if !self.remove(&CUSTOMER, id).await? {
            return Err(ClinicError::NotFound("Không tìm thấy khách hàng".into()));
        }
        Ok(())
    }

    /* ---- staff ---- */

    /// Admins see every column; everyone else gets the public subset.
    pub async fn list_staff(&self, session: &Session) -> ClinicResult<Vec<Record>> {
        let staff = self.list(&STAFF).await?;
        if session.is_admin() {
            return Ok(staff);
        }
        Ok(staff
            .into_iter()
            .map(|s| {
                PUBLIC_STAFF_FIELDS
                    .iter()
                    .map(|k| ((*k).to_string(), field(&s, k).to_string()))
                    .collect()
            })
            .collect())
    }

    pub async fn create_staff(&self, session: &Session, mut data: Record) -> ClinicResult<Record> {
        session.require_admin()?;
        require(&data, &["hoVaTen", "email", "soDienThoai"], "Thiếu thông tin bắt buộc")?;

        let staff = self.list(&STAFF).await?;
        let email = field(&data, "email").trim().to_string();
        if staff.iter().any(|s| field(s, "email").eq_ignore_ascii_case(&email)) {
            return Err(ClinicError::BadRequest("Email đã tồn tại".into()));
        }

        default_field(&mut data, "maNhanVien", generate_id(STAFF.id_prefix));
        default_field(&mut data, "ngayVaoLam", today());
        default_field(&mut data, "quyenHan", STAFF_ROLE);
        default_field(&mut data, "trangThai", ACTIVE);
        default_field(&mut data, "hoaHong", DEFAULT_COMMISSION);

        self.insert(&STAFF, &data).await?;
        Ok(data)
    }

    pub async fn update_staff(
        &self,
        session: &Session,
        id: &str,
        updates: Record,
    ) -> ClinicResult<Record> {
        session.require_admin()?;

        if !is_blank(&updates, "email") {
            let email = field(&updates, "email").trim();
            let staff = self.list(&STAFF).await?;
            if staff
                .iter()
                .any(|s| field(s, "email").eq_ignore_ascii_case(email) && field(s, "maNhanVien") != id)
            {
                return Err(ClinicError::BadRequest("Email đã được sử dụng".into()));
            }
        }

        if !self.patch(&STAFF, id, updates).await? {
            return Err(ClinicError::NotFound("Không tìm thấy nhân viên".into()));
        }
        self.fetch(&STAFF, id, "Không tìm thấy nhân viên").await
    }

    pub async fn delete_staff(&self, session: &Session, id: &str) -> ClinicResult<()> {
        session.require_admin()?;

        let member = self.fetch(&STAFF, id, "Không tìm thấy nhân viên").await?;
        if field(&member, "email").eq_ignore_ascii_case(&session.email) {
            return Err(ClinicError::Forbidden("Không thể xóa tài khoản của chính mình".into()));
        }

        if !self.remove(&STAFF, id).await? {
            return Err(ClinicError::NotFound("Không tìm thấy nhân viên".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::record;
    use super::super::testing::{admin, clinic, seed_staff, staff, OWNER};
    use super::*;

    #[tokio::test]
    async fn owner_is_admin_without_a_staff_row() {
        let (_mem, clinic) = clinic();
        let s = clinic.resolve_session("Owner@Clinic.vn").await.unwrap().unwrap();
        assert!(s.is_admin());
        assert_eq!(s.id, "ADMIN");
        assert_eq!(s.email, "Owner@Clinic.vn");
        assert!(OWNER.eq_ignore_ascii_case(&s.email));
    }

    #[tokio::test]
    async fn sessions_come_from_active_staff_rows() {
        let (mem, clinic) = clinic();
        seed_staff(&mem).await;

        assert_eq!(clinic.resolve_session("lan@clinic.vn").await.unwrap(), Some(staff()));
        assert_eq!(clinic.resolve_session("admin@clinic.vn").await.unwrap(), Some(admin()));
        assert_eq!(clinic.resolve_session("stranger@x.vn").await.unwrap(), None);
        assert_eq!(clinic.resolve_session("  ").await.unwrap(), None);

        clinic
            .update_staff(&admin(), "NV002", record([("trangThai", "Nghỉ việc")]))
            .await
            .unwrap();
        assert_eq!(clinic.resolve_session("lan@clinic.vn").await.unwrap(), None);
    }

    #[tokio::test]
    async fn customer_lifecycle() {
        let (_mem, clinic) = clinic();

        let created = clinic
            .create_customer(record([("hoVaTen", "Nguyễn Văn A"), ("soDienThoai", "901234567")]))
            .await
            .unwrap();
        let id = field(&created, "maKhachHang").to_string();
        assert!(id.starts_with("KH") && id.len() == 6);
        assert_eq!(field(&created, "trangThai"), "Mới");
        assert_eq!(field(&created, "ngayTao"), today());

        let stored = clinic.get_customer(&id).await.unwrap();
        assert_eq!(field(&stored, "soDienThoai"), "0901234567");

        let dup = clinic
            .create_customer(record([("hoVaTen", "B"), ("soDienThoai", "0901234567")]))
            .await;
        assert!(matches!(dup, Err(ClinicError::BadRequest(_))));

        let updated = clinic
            .update_customer(&id, record([("ghiChu", "dị ứng")]))
            .await
            .unwrap();
        assert_eq!(field(&updated, "ghiChu"), "dị ứng");
        assert_eq!(field(&updated, "hoVaTen"), "Nguyễn Văn A");

        assert!(matches!(
            clinic.delete_customer(&staff(), &id).await,
            Err(ClinicError::Forbidden(_))
        ));
        clinic.delete_customer(&admin(), &id).await.unwrap();
        assert!(matches!(clinic.get_customer(&id).await, Err(ClinicError::NotFound(_))));
    }

    #[tokio::test]
    async fn customers_need_name_and_phone() {
        let (_mem, clinic) = clinic();
        let err = clinic
            .create_customer(record([("hoVaTen", "A")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicError::BadRequest(_)));
        assert!(matches!(
            clinic.update_customer("KH0000", record([("ghiChu", "x")])).await,
            Err(ClinicError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn non_admins_see_public_staff_columns_only() {
        let (mem, clinic) = clinic();
        seed_staff(&mem).await;

        let full = clinic.list_staff(&admin()).await.unwrap();
        assert_eq!(field(&full[0], "soTK"), "0123456789");

        let limited = clinic.list_staff(&staff()).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].len(), PUBLIC_STAFF_FIELDS.len());
        assert!(!limited[0].contains_key("email"));
        assert_eq!(field(&limited[1], "hoVaTen"), "Lan");
    }

    #[tokio::test]
    async fn staff_management_is_admin_only() {
        let (mem, clinic) = clinic();
        seed_staff(&mem).await;

        let new = record([("hoVaTen", "Minh"), ("email", "minh@clinic.vn"), ("soDienThoai", "0902")]);
        assert!(matches!(
            clinic.create_staff(&staff(), new.clone()).await,
            Err(ClinicError::Forbidden(_))
        ));

        let created = clinic.create_staff(&admin(), new.clone()).await.unwrap();
        assert!(field(&created, "maNhanVien").starts_with("NV"));
        assert_eq!(field(&created, "quyenHan"), STAFF_ROLE);
        assert_eq!(field(&created, "trangThai"), ACTIVE);
        assert_eq!(field(&created, "hoaHong"), "10");

        assert!(matches!(
            clinic.create_staff(&admin(), new).await,
            Err(ClinicError::BadRequest(_))
        ));
        assert!(matches!(
            clinic
                .update_staff(&admin(), "NV002", record([("email", "admin@clinic.vn")]))
                .await,
            Err(ClinicError::BadRequest(_))
        ));
        let same = clinic
            .update_staff(&admin(), "NV002", record([("email", "lan@clinic.vn"), ("chucVu", "Trưởng")]))
            .await
            .unwrap();
        assert_eq!(field(&same, "chucVu"), "Trưởng");
    }

    #[tokio::test]
    async fn admins_cannot_delete_themselves() {
        let (mem, clinic) = clinic();
        seed_staff(&mem).await;

        assert!(matches!(
            clinic.delete_staff(&admin(), "NV001").await,
            Err(ClinicError::Forbidden(_))
        ));
        assert!(matches!(
            clinic.delete_staff(&admin(), "NV999").await,
            Err(ClinicError::NotFound(_))
        ));
        clinic.delete_staff(&admin(), "NV002").await.unwrap();
        assert_eq!(clinic.list_staff(&admin()).await.unwrap().len(), 1);
    }
}
