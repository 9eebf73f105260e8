use super::{default_field, require, set, Clinic, ClinicError, ClinicResult, Session, ACTIVE};
use crate::entities::{EntitySpec, PRODUCT, SERVICE};
use crate::ids::generate_id;
use crate::mapping::Record;

const IN_STOCK: &str = "Còn hàng";

impl Clinic {
    pub async fn list_products(&self) -> ClinicResult<Vec<Record>> {
        self.list(&PRODUCT).await
    }

    pub async fn create_product(&self, session: &Session, mut data: Record) -> ClinicResult<Record> {
        session.require_admin()?;
        require(&data, &["tenSanPham", "giaBan"], "Thiếu thông tin bắt buộc")?;

        set(&mut data, "maSanPham", generate_id(PRODUCT.id_prefix));
        default_field(&mut data, "soLuongTon", "0");
        default_field(&mut data, "trangThai", IN_STOCK);

        self.insert(&PRODUCT, &data).await?;
        Ok(data)
    }

    pub async fn update_product(&self, session: &Session, id: &str, updates: Record) -> ClinicResult<Record> {
        self.update_catalog_item(session, &PRODUCT, id, updates, "Không tìm thấy sản phẩm")
            .await
    }

    pub async fn delete_product(&self, session: &Session, id: &str) -> ClinicResult<()> {
        self.delete_catalog_item(session, &PRODUCT, id, "Không tìm thấy sản phẩm")
            .await
    }

    pub async fn list_services(&self) -> ClinicResult<Vec<Record>> {
        self.list(&SERVICE).await
    }

    pub async fn create_service(&self, session: &Session, mut data: Record) -> ClinicResult<Record> {
        session.require_admin()?;
        require(&data, &["tenDichVu", "giaDichVu"], "Thiếu thông tin bắt buộc")?;

        set(&mut data, "maDichVu", generate_id(SERVICE.id_prefix));
        default_field(&mut data, "trangThai", ACTIVE);

        self.insert(&SERVICE, &data).await?;
        Ok(data)
    }

    pub async fn update_service(&self, session: &Session, id: &str, updates: Record) -> ClinicResult<Record> {
        self.update_catalog_item(session, &SERVICE, id, updates, "Không tìm thấy dịch vụ")
            .await
    }

    pub async fn delete_service(&self, session: &Session, id: &str) -> ClinicResult<()> {
        self.delete_catalog_item(session, &SERVICE, id, "Không tìm thấy dịch vụ")
            .await
    }

    async fn update_catalog_item(
        &self,
        session: &Session,
        spec: &EntitySpec,
        id: &str,
        updates: Record,
        missing: &str,
    ) -> ClinicResult<Record> {
        session.require_admin()?;
        if !self.patch(spec, id, updates).await? {
            return Err(ClinicError::NotFound(missing.to_string()));
        }
        self.fetch(spec, id, missing).await
    }

    async fn delete_catalog_item(
        &self,
        session: &Session,
        spec: &EntitySpec,
        id: &str,
        missing: &str,
    ) -> ClinicResult<()> {
        session.require_admin()?;
        if !self.remove(spec, id).await? {
            return Err(ClinicError::NotFound(missing.to_string()));
        }
        Ok(())
    }
}
